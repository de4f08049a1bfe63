//! Usage: Codex (ChatGPT) usage integration.
//!
//! - Limits via `chatgpt.com/backend-api/wham/usage`
//! - Falls back to `x-codex-*` rate-limit headers when the body is not recognized

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::snapshot::{CreditsSnapshot, RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{FetchContext, FetchFuture, UsageProvider};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

const CODEX_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
/// User-Agent sent with Codex quota requests (matches upstream codex_cli_rs).
const CODEX_QUOTA_USER_AGENT: &str = "codex_cli_rs/0.76.0 (Debian 13.0.0; x86_64) WindowsTerminal";

const PLAN_TYPES: &[&str] = &[
    "guest",
    "free",
    "go",
    "plus",
    "pro",
    "free_workspace",
    "team",
    "business",
    "education",
    "quorum",
    "k12",
    "enterprise",
    "edu",
];

pub struct CodexUsageProvider {
    usage_url: String,
}

impl Default for CodexUsageProvider {
    fn default() -> Self {
        Self::with_usage_url(CODEX_USAGE_URL)
    }
}

impl CodexUsageProvider {
    pub fn with_usage_url(url: impl Into<String>) -> Self {
        Self {
            usage_url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsageWindow {
    used_percent: f64,
    limit_window_seconds: f64,
    #[serde(default)]
    reset_after_seconds: Option<f64>,
    #[serde(default)]
    reset_at: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RateLimit {
    #[serde(default)]
    primary_window: Option<UsageWindow>,
    #[serde(default)]
    secondary_window: Option<UsageWindow>,
}

#[derive(Debug, Deserialize)]
struct CodeReviewRateLimit {
    #[serde(default)]
    primary_window: Option<UsageWindow>,
}

#[derive(Debug, Deserialize)]
struct Credits {
    has_credits: bool,
    unlimited: bool,
    #[serde(default)]
    balance: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    plan_type: Option<String>,
    rate_limit: RateLimit,
    #[serde(default)]
    code_review_rate_limit: Option<CodeReviewRateLimit>,
    #[serde(default)]
    credits: Option<Credits>,
}

fn to_window(window: &UsageWindow, now_secs: i64) -> Option<RateLimitWindow> {
    let minutes = (window.limit_window_seconds / 60.0).round() as i64;
    let resets_at = window
        .reset_at
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as i64)
        .or_else(|| {
            window
                .reset_after_seconds
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| now_secs.saturating_add(v.round() as i64))
        });
    RateLimitWindow::new(window.used_percent, Some(minutes), resets_at)
}

fn balance_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|v| !v.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_plan_type(value: Option<&str>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    PLAN_TYPES
        .iter()
        .find(|p| p.eq_ignore_ascii_case(value))
        .map(|p| p.to_string())
}

/// Pure normalizer for the `wham/usage` body.
pub fn normalize_usage_body(body: &Value, now_secs: i64) -> Option<UsageSnapshot> {
    let parsed: UsageResponse = serde_json::from_value(body.clone()).ok()?;

    let mut snapshot = UsageSnapshot::new(ProviderId::Codex, now_secs);
    snapshot.plan_type = to_plan_type(parsed.plan_type.as_deref());
    snapshot.primary = parsed
        .rate_limit
        .primary_window
        .as_ref()
        .and_then(|w| to_window(w, now_secs));
    snapshot.secondary = parsed
        .rate_limit
        .secondary_window
        .as_ref()
        .and_then(|w| to_window(w, now_secs));
    snapshot.code_review = parsed
        .code_review_rate_limit
        .as_ref()
        .and_then(|c| c.primary_window.as_ref())
        .and_then(|w| to_window(w, now_secs));
    snapshot.credits = parsed.credits.map(|c| CreditsSnapshot {
        has_credits: c.has_credits,
        unlimited: c.unlimited,
        balance: c.balance.as_ref().and_then(balance_text),
    });

    snapshot.has_usage_data().then_some(snapshot)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    header_str(headers, name)?.parse::<f64>().ok()
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    header_str(headers, name)?.parse::<i64>().ok()
}

fn header_bool(headers: &HeaderMap, name: &str) -> Option<bool> {
    match header_str(headers, name)?.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn header_window(headers: &HeaderMap, prefix: &str) -> Option<RateLimitWindow> {
    let used = header_f64(headers, &format!("x-codex-{prefix}-used-percent"))?;
    RateLimitWindow::new(
        used,
        header_i64(headers, &format!("x-codex-{prefix}-window-minutes")),
        header_i64(headers, &format!("x-codex-{prefix}-reset-at")),
    )
}

/// Pure normalizer for the rate-limit headers the backend attaches to responses.
pub fn normalize_rate_limit_headers(headers: &HeaderMap, now_secs: i64) -> Option<UsageSnapshot> {
    let mut snapshot = UsageSnapshot::new(ProviderId::Codex, now_secs);
    snapshot.primary = header_window(headers, "primary");
    snapshot.secondary = header_window(headers, "secondary");
    snapshot.credits =
        header_bool(headers, "x-codex-credits-has-credits").map(|has_credits| CreditsSnapshot {
            has_credits,
            unlimited: header_bool(headers, "x-codex-credits-unlimited").unwrap_or(false),
            balance: header_str(headers, "x-codex-credits-balance").map(str::to_string),
        });
    snapshot.has_usage_data().then_some(snapshot)
}

impl UsageProvider for CodexUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Codex
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let Some(ProviderCredential::Codex(cred)) = credential else {
                return Ok(None);
            };

            let mut request = ctx
                .client
                .get(self.usage_url.as_str())
                .header("Authorization", format!("Bearer {}", cred.access))
                .header("User-Agent", CODEX_QUOTA_USER_AGENT)
                .header("Accept", "application/json");
            if let Some(account_id) = cred.account_id.as_deref() {
                request = request.header("ChatGPT-Account-Id", account_id);
            }

            let response = request
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: codex usage request failed: {e}"))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();

            if status.is_success() {
                if let Some(snapshot) = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| normalize_usage_body(&v, ctx.now_secs))
                {
                    return Ok(Some(snapshot));
                }
                tracing::debug!("codex usage body not recognized; trying rate-limit headers");
            }

            if let Some(snapshot) = normalize_rate_limit_headers(&headers, ctx.now_secs) {
                return Ok(Some(snapshot));
            }

            if !status.is_success() {
                return Err(format!(
                    "SYSTEM_ERROR: codex usage request failed with status {}",
                    status.as_u16()
                )
                .into());
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::CodexCredential;
    use crate::infra::settings::UsageSettings;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn window(used: f64, seconds: f64) -> Value {
        json!({
            "used_percent": used,
            "limit_window_seconds": seconds,
            "reset_after_seconds": 120,
            "reset_at": 1_700_018_000
        })
    }

    #[test]
    fn normalize_usage_body_maps_windows_credits_and_plan() {
        let body = json!({
            "plan_type": "plus",
            "rate_limit": {
                "allowed": true,
                "limit_reached": false,
                "primary_window": window(42.5, 18_000.0),
                "secondary_window": window(130.0, 604_800.0)
            },
            "code_review_rate_limit": {"primary_window": window(3.0, 604_800.0)},
            "credits": {"has_credits": true, "unlimited": false, "balance": "12.50"}
        });

        let snapshot = normalize_usage_body(&body, NOW).unwrap();
        assert_eq!(snapshot.provider, ProviderId::Codex);
        assert_eq!(snapshot.plan_type.as_deref(), Some("plus"));
        let primary = snapshot.primary.as_ref().unwrap();
        assert_eq!(primary.used_percent, 42.5);
        assert_eq!(primary.window_minutes, Some(300));
        assert_eq!(primary.resets_at, Some(1_700_018_000));
        let secondary = snapshot.secondary.as_ref().unwrap();
        assert_eq!(secondary.used_percent, 100.0);
        assert_eq!(secondary.window_minutes, Some(10_080));
        assert!(snapshot.code_review.is_some());
        assert_eq!(
            snapshot.credits.as_ref().unwrap().balance.as_deref(),
            Some("12.50")
        );
        for w in snapshot.windows() {
            assert!((0.0..=100.0).contains(&w.used_percent));
        }
    }

    #[test]
    fn reset_after_seconds_is_used_when_reset_at_absent() {
        let body = json!({
            "plan_type": null,
            "rate_limit": {
                "primary_window": {"used_percent": 1, "limit_window_seconds": 3600, "reset_after_seconds": 60},
                "secondary_window": null
            },
            "credits": null
        });
        let snapshot = normalize_usage_body(&body, NOW).unwrap();
        assert_eq!(snapshot.primary.unwrap().resets_at, Some(NOW + 60));
        assert_eq!(snapshot.secondary, None);
        assert_eq!(snapshot.plan_type, None);
    }

    #[test]
    fn huge_reset_after_seconds_does_not_overflow() {
        let body = json!({
            "rate_limit": {
                "primary_window": {"used_percent": 3, "limit_window_seconds": 3600, "reset_after_seconds": 1e30},
                "secondary_window": null
            },
            "credits": null
        });
        let primary = normalize_usage_body(&body, NOW).unwrap().primary.unwrap();
        assert_eq!(primary.used_percent, 3.0);
        assert!(primary.resets_at.is_some());
    }

    #[test]
    fn unknown_plan_types_are_dropped_and_empty_payloads_decline() {
        let body = json!({
            "plan_type": "mystery",
            "rate_limit": {"primary_window": window(5.0, 18_000.0), "secondary_window": null},
            "credits": null
        });
        assert_eq!(normalize_usage_body(&body, NOW).unwrap().plan_type, None);

        let empty = json!({
            "plan_type": "plus",
            "rate_limit": {"primary_window": null, "secondary_window": null},
            "credits": null
        });
        assert!(normalize_usage_body(&empty, NOW).is_none());
        assert!(normalize_usage_body(&json!({"detail": "nope"}), NOW).is_none());
    }

    #[test]
    fn rate_limit_headers_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-codex-primary-used-percent", HeaderValue::from_static("12.5"));
        headers.insert("x-codex-primary-window-minutes", HeaderValue::from_static("300"));
        headers.insert("x-codex-primary-reset-at", HeaderValue::from_static("1700018000000"));
        headers.insert("x-codex-credits-has-credits", HeaderValue::from_static("true"));

        let snapshot = normalize_rate_limit_headers(&headers, NOW).unwrap();
        let primary = snapshot.primary.unwrap();
        assert_eq!(primary.used_percent, 12.5);
        assert_eq!(primary.resets_at, Some(1_700_018_000));
        assert_eq!(snapshot.secondary, None);
        assert!(!snapshot.credits.unwrap().unlimited);

        assert!(normalize_rate_limit_headers(&HeaderMap::new(), NOW).is_none());
    }

    #[tokio::test]
    async fn fetch_sends_account_header_and_normalizes_body() {
        use axum::{http::HeaderMap as AxumHeaders, routing::get, Json, Router};

        let app = Router::new().route(
            "/wham/usage",
            get(|headers: AxumHeaders| async move {
                let account = headers
                    .get("chatgpt-account-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let used = if account == "acct-1" { 10.0 } else { 99.0 };
                Json(json!({
                    "plan_type": "pro",
                    "rate_limit": {"primary_window": window(used, 18_000.0), "secondary_window": null},
                    "credits": null
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = CodexUsageProvider::with_usage_url(format!("http://{addr}/wham/usage"));
        let ctx = FetchContext {
            client: reqwest::Client::new(),
            settings: UsageSettings::default(),
            copilot_usage_token: None,
            now_secs: NOW,
        };
        let credential = ProviderCredential::Codex(CodexCredential {
            access: "token".to_string(),
            refresh: None,
            account_id: Some("acct-1".to_string()),
            expires_at_ms: None,
        });

        let snapshot = provider
            .fetch_usage(&ctx, Some(&credential))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.primary.unwrap().used_percent, 10.0);
        assert_eq!(snapshot.plan_type.as_deref(), Some("pro"));

        assert!(provider.fetch_usage(&ctx, None).await.unwrap().is_none());
    }
}
