//! Usage: UsageProvider trait definition - the seam every usage integration implements.
//!
//! The fetch orchestrator only talks to `&dyn UsageProvider`; adding an integration means
//! implementing this trait and registering it in `ProviderRegistry::builtin`.

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::snapshot::UsageSnapshot;
use crate::infra::settings::UsageSettings;
use crate::shared::error::AppResult;
use std::future::Future;
use std::pin::Pin;

/// Read-only inputs shared by every fetch within one aggregation request.
#[derive(Clone)]
pub struct FetchContext {
    pub client: reqwest::Client,
    pub settings: UsageSettings,
    /// Side-channel Copilot token from the usage login flow.
    pub copilot_usage_token: Option<String>,
    /// Capture time stamped on every snapshot, Unix seconds.
    pub now_secs: i64,
}

impl FetchContext {
    pub fn new(client: reqwest::Client, settings: UsageSettings) -> Self {
        Self {
            client,
            settings,
            copilot_usage_token: None,
            now_secs: crate::shared::time::now_unix_seconds(),
        }
    }
}

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = AppResult<Option<UsageSnapshot>>> + Send + 'a>>;

/// `Ok(None)` means the payload held nothing recognizable; errors are folded into placeholder
/// diagnostics by the orchestrator and never reach sibling providers.
pub trait UsageProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn display_name(&self) -> &'static str {
        self.id().display_name()
    }

    /// Attempted once per aggregation even without a resolved credential.
    fn is_special(&self) -> bool {
        self.id().is_special()
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a>;
}

/// Shared GET helper: non-success statuses become `SYSTEM_ERROR` with a trimmed body snippet.
pub(crate) async fn read_json_response(
    response: reqwest::Response,
    what: &str,
) -> AppResult<serde_json::Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: {what} response read failed: {e}"))?;
    if !status.is_success() {
        let snippet: String = body.chars().take(200).collect();
        return Err(format!(
            "SYSTEM_ERROR: {what} request failed with status {}: {snippet}",
            status.as_u16()
        )
        .into());
    }
    serde_json::from_str(&body)
        .map_err(|e| format!("SYSTEM_ERROR: {what} returned invalid json: {e}").into())
}
