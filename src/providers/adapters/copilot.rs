//! Usage: GitHub Copilot usage integration.
//!
//! - Quota via `api.github.com/copilot_internal/user` (`token` auth, then `Bearer` after a
//!   `copilot_internal/v2/token` exchange)
//! - The side-channel usage token is tried before the stored OAuth token

use crate::domain::credentials::{CopilotCredential, ProviderCredential, ProviderId};
use crate::domain::quota::{CopilotQuota, QuotaExtension};
use crate::domain::snapshot::{RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{FetchContext, FetchFuture, UsageProvider};
use crate::shared::error::AppResult;
use crate::shared::time::parse_reset_time;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const GITHUB_API_BASE_URL: &str = "https://api.github.com";
const COPILOT_VERSION: &str = "0.35.0";
const EDITOR_VERSION: &str = "vscode/1.107.0";
const COPILOT_INTEGRATION_ID: &str = "vscode-chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Free-tier payloads report chat in tenths when the monthly total is 500.
const CHAT_SCALED_TOTAL: i64 = 500;
const CHAT_SCALE: i64 = 10;
const COMPLETIONS_SCALED_TOTAL: i64 = 4000;
const COMPLETIONS_SCALE: i64 = 2;
const DEFAULT_COMPLETIONS_TOTAL: i64 = 2000;

const SKU_PLAN_MAP: &[(&str, &str)] = &[
    ("free_limited_copilot", "free"),
    ("copilot_for_individual", "pro"),
    ("copilot_individual", "pro"),
    ("copilot_business", "business"),
    ("copilot_for_business", "business"),
    ("copilot_enterprise", "enterprise"),
];

#[derive(Default)]
pub struct CopilotUsageProvider {
    api_base_override: Option<String>,
}

impl CopilotUsageProvider {
    pub fn with_api_base(base: impl Into<String>) -> Self {
        Self {
            api_base_override: Some(base.into()),
        }
    }

    fn api_base(&self, credential: Option<&CopilotCredential>) -> String {
        if let Some(base) = self.api_base_override.as_deref() {
            return base.trim_end_matches('/').to_string();
        }
        credential
            .and_then(|c| c.enterprise_url.as_deref())
            .and_then(enterprise_api_base)
            .unwrap_or_else(|| GITHUB_API_BASE_URL.to_string())
    }
}

/// `https://github.example.com/` -> `https://api.github.example.com`.
fn enterprise_api_base(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split('/')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())?;
    if host.eq_ignore_ascii_case("github.com") {
        return None;
    }
    Some(format!("https://api.{host}"))
}

#[derive(Debug, Default, Deserialize)]
struct LimitedQuotas {
    #[serde(default)]
    chat: Option<f64>,
    #[serde(default)]
    completions: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuotaSnapshot {
    #[serde(default)]
    entitlement: f64,
    #[serde(default)]
    remaining: f64,
    #[serde(default)]
    percent_remaining: f64,
    #[serde(default)]
    unlimited: bool,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaSnapshots {
    #[serde(default)]
    premium_interactions: Option<QuotaSnapshot>,
}

#[derive(Debug, Deserialize)]
struct InternalUserResponse {
    #[serde(default)]
    access_type_sku: Option<String>,
    #[serde(default)]
    copilot_plan: Option<String>,
    #[serde(default)]
    limited_user_quotas: Option<LimitedQuotas>,
    #[serde(default)]
    limited_user_reset_date: Option<Value>,
    #[serde(default)]
    quota_reset_date: Option<Value>,
    #[serde(default)]
    quota_snapshots: Option<QuotaSnapshots>,
    #[serde(default)]
    monthly_quotas: Option<LimitedQuotas>,
}

fn reset_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|v| !v.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scaled(raw: i64, total_raw: i64, scaled_total: i64, scale: i64) -> i64 {
    if total_raw == scaled_total {
        raw.div_euclid(scale)
    } else {
        raw
    }
}

fn sku_to_plan(sku: &str) -> Option<String> {
    let sku = sku.trim();
    if sku.is_empty() {
        return None;
    }
    if let Some((_, plan)) = SKU_PLAN_MAP.iter().find(|(k, _)| k.eq_ignore_ascii_case(sku)) {
        return Some(plan.to_string());
    }
    let normalized = sku.to_ascii_lowercase();
    let plan = if normalized.contains("free") {
        "free"
    } else if normalized.contains("individual") || normalized.contains("pro") {
        "pro"
    } else if normalized.contains("business") {
        "business"
    } else if normalized.contains("enterprise") {
        "enterprise"
    } else {
        return None;
    };
    Some(plan.to_string())
}

fn to_quota(data: &InternalUserResponse) -> Option<CopilotQuota> {
    if let Some(limited) = data.limited_user_quotas.as_ref() {
        let monthly = data.monthly_quotas.as_ref();
        let chat_total_raw = monthly.and_then(|m| m.chat).unwrap_or(0.0) as i64;
        let chat_remaining_raw = limited.chat.unwrap_or(0.0) as i64;
        let chat_total = scaled(chat_total_raw, chat_total_raw, CHAT_SCALED_TOTAL, CHAT_SCALE);
        let chat_remaining =
            scaled(chat_remaining_raw, chat_total_raw, CHAT_SCALED_TOTAL, CHAT_SCALE);

        let completions_total_raw = monthly
            .and_then(|m| m.completions)
            .map(|v| v as i64)
            .unwrap_or(DEFAULT_COMPLETIONS_TOTAL);
        let completions_remaining_raw = limited.completions.unwrap_or(0.0) as i64;

        let percent_remaining = if chat_total > 0 {
            ((chat_remaining as f64 / chat_total as f64) * 100.0).round()
        } else {
            0.0
        };

        return Some(CopilotQuota {
            remaining: chat_remaining,
            total: chat_total,
            percent_remaining,
            reset_time: reset_text(data.limited_user_reset_date.as_ref())
                .or_else(|| reset_text(data.quota_reset_date.as_ref())),
            completions_remaining: Some(scaled(
                completions_remaining_raw,
                completions_total_raw,
                COMPLETIONS_SCALED_TOTAL,
                COMPLETIONS_SCALE,
            )),
            completions_total: Some(scaled(
                completions_total_raw,
                completions_total_raw,
                COMPLETIONS_SCALED_TOTAL,
                COMPLETIONS_SCALE,
            )),
        });
    }

    let premium = data
        .quota_snapshots
        .as_ref()
        .and_then(|s| s.premium_interactions.as_ref())?;
    let (remaining, total) = if premium.unlimited {
        (-1, -1)
    } else {
        let total_raw = premium.entitlement as i64;
        (
            scaled(premium.remaining as i64, total_raw, CHAT_SCALED_TOTAL, CHAT_SCALE),
            scaled(total_raw, total_raw, CHAT_SCALED_TOTAL, CHAT_SCALE),
        )
    };
    Some(CopilotQuota {
        remaining,
        total,
        percent_remaining: premium.percent_remaining.round(),
        reset_time: reset_text(data.quota_reset_date.as_ref()),
        completions_remaining: None,
        completions_total: None,
    })
}

/// Pure normalizer for the `copilot_internal/user` body.
pub fn normalize_user_body(body: &Value, now_secs: i64) -> Option<UsageSnapshot> {
    let data: InternalUserResponse = serde_json::from_value(body.clone()).ok()?;
    let quota = to_quota(&data)?;

    let mut snapshot = UsageSnapshot::new(ProviderId::Copilot, now_secs);
    snapshot.plan_type = data
        .access_type_sku
        .as_deref()
        .and_then(sku_to_plan)
        .or_else(|| data.copilot_plan.as_deref().and_then(sku_to_plan));
    let resets_at = quota.reset_time.as_deref().and_then(parse_reset_time);
    if quota.total != -1 {
        snapshot.primary =
            RateLimitWindow::from_remaining_percent(quota.percent_remaining, None, resets_at);
    }
    snapshot.quota = Some(QuotaExtension::Copilot(quota));
    Some(snapshot)
}

fn with_editor_headers(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request
        .header("Accept", "application/json")
        .header("User-Agent", format!("GitHubCopilotChat/{COPILOT_VERSION}"))
        .header("Editor-Version", EDITOR_VERSION)
        .header("Editor-Plugin-Version", format!("copilot-chat/{COPILOT_VERSION}"))
        .header("Copilot-Integration-Id", COPILOT_INTEGRATION_ID)
        .timeout(REQUEST_TIMEOUT)
}

impl CopilotUsageProvider {
    async fn get_user(
        &self,
        client: &reqwest::Client,
        base: &str,
        authorization: String,
    ) -> AppResult<reqwest::Response> {
        with_editor_headers(client.get(format!("{base}/copilot_internal/user")))
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: copilot usage request failed: {e}").into())
    }

    async fn exchange_token(
        &self,
        client: &reqwest::Client,
        base: &str,
        oauth_token: &str,
    ) -> Option<String> {
        let response = with_editor_headers(client.get(format!("{base}/copilot_internal/v2/token")))
            .header("Authorization", format!("Bearer {oauth_token}"))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!(
                status = response.status().as_u16(),
                "copilot token exchange rejected"
            );
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    async fn fetch_with_token(
        &self,
        ctx: &FetchContext,
        base: &str,
        oauth_token: &str,
    ) -> AppResult<Option<UsageSnapshot>> {
        let mut response = self
            .get_user(&ctx.client, base, format!("token {oauth_token}"))
            .await?;

        if !response.status().is_success() {
            tracing::debug!(
                status = response.status().as_u16(),
                "copilot usage rejected direct token; exchanging"
            );
            if let Some(copilot_token) = self.exchange_token(&ctx.client, base, oauth_token).await {
                response = self
                    .get_user(&ctx.client, base, format!("Bearer {copilot_token}"))
                    .await?;
            }
        }

        let body = crate::providers::provider_trait::read_json_response(response, "copilot usage")
            .await?;
        Ok(normalize_user_body(&body, ctx.now_secs))
    }
}

impl UsageProvider for CopilotUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Copilot
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let stored = match credential {
                Some(ProviderCredential::Copilot(c)) => Some(c),
                _ => None,
            };
            let mut tokens: Vec<&str> = Vec::new();
            if let Some(token) = ctx.copilot_usage_token.as_deref() {
                tokens.push(token);
            }
            if let Some(c) = stored {
                if !tokens.contains(&c.token.as_str()) {
                    tokens.push(c.token.as_str());
                }
            }
            if tokens.is_empty() {
                return Ok(None);
            }

            let base = self.api_base(stored);
            let mut last_error = None;
            for token in tokens {
                match self.fetch_with_token(ctx, &base, token).await {
                    Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(token = %crate::shared::security::mask_token(token), "copilot usage attempt failed: {}", err);
                        last_error = Some(err);
                    }
                }
            }
            match last_error {
                Some(err) => Err(err),
                None => Ok(None),
            }
        })
    }
}
