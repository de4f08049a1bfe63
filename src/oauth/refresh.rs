//! Usage: OAuth refresh decision and execution helpers for stored Codex credentials.

use crate::domain::credentials::CodexCredential;
use crate::oauth::token_exchange::{
    account_id_from_claims, decode_jwt_claims, refresh_access_token, TokenEndpoint,
};
use crate::shared::error::UsageError;
use std::future::Future;
use std::pin::Pin;

/// Refresh this long before the recorded expiry.
pub const REFRESH_MARGIN_MS: i64 = 30_000;

/// All arguments are in milliseconds so sub-second remainders are not truncated away.
pub(crate) fn should_refresh_now(expires_at_ms: Option<i64>, refresh_lead_ms: i64, now_ms: i64) -> bool {
    let Some(expiry) = expires_at_ms else {
        return false;
    };
    let lead = refresh_lead_ms.max(0);
    expiry <= now_ms.saturating_add(lead)
}

/// Returns the credential unchanged when it is fresh (or its expiry is unknown), otherwise a
/// refreshed copy. The caller decides whether a `RefreshFailed` is fatal.
pub async fn ensure_fresh(
    client: &reqwest::Client,
    endpoint: &TokenEndpoint,
    credential: &CodexCredential,
    now_ms: i64,
) -> Result<CodexCredential, UsageError> {
    if !should_refresh_now(credential.expires_at_ms, REFRESH_MARGIN_MS, now_ms) {
        return Ok(credential.clone());
    }

    let refresh_token = credential
        .refresh
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            UsageError::RefreshFailed("credential expired and has no refresh token".to_string())
        })?;

    let tokens = refresh_access_token(client, endpoint, refresh_token).await?;

    let account_id = tokens
        .id_token
        .as_deref()
        .and_then(decode_jwt_claims)
        .or_else(|| decode_jwt_claims(&tokens.access_token))
        .as_ref()
        .and_then(account_id_from_claims)
        .or_else(|| credential.account_id.clone());

    tracing::info!(
        has_new_refresh_token = tokens.refresh_token.is_some(),
        expires_in_secs = tokens.expires_in_secs,
        "codex access token refreshed"
    );

    Ok(CodexCredential {
        access: tokens.access_token,
        refresh: tokens
            .refresh_token
            .or_else(|| credential.refresh.clone()),
        account_id,
        expires_at_ms: Some(now_ms.saturating_add(tokens.expires_in_secs.saturating_mul(1000))),
    })
}

pub type RefreshFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CodexCredential, UsageError>> + Send + 'a>>;

/// Seam used by account rotation so it can run without a live token endpoint.
pub trait CredentialRefresher: Send + Sync {
    fn ensure_fresh<'a>(&'a self, credential: &'a CodexCredential) -> RefreshFuture<'a>;
}

pub struct HttpCodexRefresher {
    client: reqwest::Client,
    endpoint: TokenEndpoint,
}

impl HttpCodexRefresher {
    pub fn new(client: reqwest::Client, endpoint: TokenEndpoint) -> Self {
        Self { client, endpoint }
    }
}

impl CredentialRefresher for HttpCodexRefresher {
    fn ensure_fresh<'a>(&'a self, credential: &'a CodexCredential) -> RefreshFuture<'a> {
        Box::pin(async move {
            ensure_fresh(
                &self.client,
                &self.endpoint,
                credential,
                crate::shared::time::now_unix_millis(),
            )
            .await
        })
    }
}
