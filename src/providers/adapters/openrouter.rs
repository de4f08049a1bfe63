//! Usage: OpenRouter API-key usage integration (`openrouter.ai/api/v1/key`).

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::quota::{OpenRouterQuota, QuotaExtension};
use crate::domain::snapshot::{CreditsSnapshot, RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{read_json_response, FetchContext, FetchFuture, UsageProvider};
use crate::shared::time::parse_reset_time;
use serde::Deserialize;
use serde_json::Value;

const OPENROUTER_KEY_URL: &str = "https://openrouter.ai/api/v1/key";

pub struct OpenRouterUsageProvider {
    key_url: String,
}

impl Default for OpenRouterUsageProvider {
    fn default() -> Self {
        Self::with_key_url(OPENROUTER_KEY_URL)
    }
}

impl OpenRouterUsageProvider {
    pub fn with_key_url(url: impl Into<String>) -> Self {
        Self {
            key_url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeyData {
    #[serde(default)]
    limit: Option<f64>,
    #[serde(default)]
    limit_reset: Option<String>,
    #[serde(default)]
    limit_remaining: Option<f64>,
    usage: f64,
    #[serde(default)]
    usage_daily: f64,
    #[serde(default)]
    usage_weekly: f64,
    #[serde(default)]
    usage_monthly: f64,
    #[serde(default)]
    is_free_tier: bool,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    data: KeyData,
}

fn is_unlimited(limit: Option<f64>) -> bool {
    match limit {
        None => true,
        Some(v) => v == -1.0,
    }
}

/// Pure normalizer for the `/api/v1/key` body.
pub fn normalize_key_body(body: &Value, now_secs: i64) -> Option<UsageSnapshot> {
    let parsed: KeyResponse = serde_json::from_value(body.clone()).ok()?;
    let data = parsed.data;

    let mut snapshot = UsageSnapshot::new(ProviderId::OpenRouter, now_secs);
    snapshot.plan_type = Some(if data.is_free_tier { "free" } else { "paid" }.to_string());
    snapshot.primary = data.limit.filter(|l| *l > 0.0).and_then(|limit| {
        RateLimitWindow::new(
            data.usage / limit * 100.0,
            None,
            data.limit_reset.as_deref().and_then(parse_reset_time),
        )
    });

    let unlimited = is_unlimited(data.limit);
    snapshot.credits = Some(CreditsSnapshot {
        has_credits: true,
        unlimited,
        balance: if unlimited {
            Some("Unlimited".to_string())
        } else {
            data.limit_remaining.map(|v| format!("${v:.2}"))
        },
    });
    snapshot.quota = Some(QuotaExtension::OpenRouter(OpenRouterQuota {
        limit: data.limit,
        usage: data.usage,
        limit_remaining: data.limit_remaining,
        usage_daily: data.usage_daily,
        usage_weekly: data.usage_weekly,
        usage_monthly: data.usage_monthly,
        is_free_tier: data.is_free_tier,
    }));
    Some(snapshot)
}

impl UsageProvider for OpenRouterUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let Some(ProviderCredential::ApiKey(cred)) = credential else {
                return Ok(None);
            };
            let response = ctx
                .client
                .get(self.key_url.as_str())
                .header("Authorization", format!("Bearer {}", cred.key))
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: openrouter key request failed: {e}"))?;
            let body = read_json_response(response, "openrouter key").await?;
            Ok(normalize_key_body(&body, ctx.now_secs))
        })
    }
}
