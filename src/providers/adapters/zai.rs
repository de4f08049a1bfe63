//! Usage: Z.ai GLM Coding Plan usage integration (`/api/monitor/usage/quota/limit`).

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::quota::{QuotaExtension, ZaiLimit, ZaiQuota};
use crate::domain::snapshot::{clamp_percent, RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{read_json_response, FetchContext, FetchFuture, UsageProvider};
use crate::shared::time::normalize_epoch_f64;
use serde::Deserialize;
use serde_json::Value;

const TOKENS_LIMIT: &str = "TOKENS_LIMIT";
const TIME_LIMIT: &str = "TIME_LIMIT";

pub struct ZaiUsageProvider;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLimit {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    usage: f64,
    #[serde(default)]
    current_value: f64,
    #[serde(default)]
    remaining: f64,
    #[serde(default)]
    percentage: f64,
    #[serde(default)]
    next_reset_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuotaData {
    #[serde(default)]
    limits: Vec<RawLimit>,
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    data: QuotaData,
}

/// Pure normalizer for the quota/limit body.
pub fn normalize_quota_body(body: &Value, now_secs: i64) -> Option<UsageSnapshot> {
    let parsed: QuotaResponse = serde_json::from_value(body.clone()).ok()?;
    let limits: Vec<ZaiLimit> = parsed
        .data
        .limits
        .into_iter()
        .map(|l| ZaiLimit {
            kind: l.kind,
            usage: l.usage,
            current_value: l.current_value,
            remaining: l.remaining,
            percentage: clamp_percent(l.percentage).unwrap_or(0.0),
            resets_at: l.next_reset_time.and_then(normalize_epoch_f64),
        })
        .collect();
    if limits.is_empty() {
        return None;
    }

    let window_for = |kind: &str| {
        limits
            .iter()
            .find(|l| l.kind.eq_ignore_ascii_case(kind))
            .and_then(|l| RateLimitWindow::new(l.percentage, None, l.resets_at))
    };

    let mut snapshot = UsageSnapshot::new(ProviderId::Zai, now_secs);
    snapshot.primary = window_for(TOKENS_LIMIT);
    snapshot.secondary = window_for(TIME_LIMIT);
    snapshot.quota = Some(QuotaExtension::Zai(ZaiQuota { limits }));
    Some(snapshot)
}

impl UsageProvider for ZaiUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Zai
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
            let url = format!(
                "{}/api/monitor/usage/quota/limit",
                ctx.settings.zai_base_url()
            );
            let response = ctx
                .client
                .get(url)
                .header("Authorization", cred.key.as_str())
                .header("Accept-Language", "en-US,en")
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: zai quota request failed: {e}"))?;
            let body = read_json_response(response, "zai quota").await?;
            Ok(normalize_quota_body(&body, ctx.now_secs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::ApiKeyCredential;
    use crate::infra::settings::UsageSettings;
    use serde_json::json;

    fn quota_body() -> Value {
        json!({
            "code": 200,
            "msg": "ok",
            "success": true,
            "data": {"limits": [
                {"type": "TIME_LIMIT", "unit": 5, "number": 1, "usage": 1000, "currentValue": 120, "remaining": 880, "percentage": 12},
                {"type": "TOKENS_LIMIT", "unit": 3, "number": 5, "usage": 40000000, "currentValue": 14000000, "remaining": 26000000, "percentage": 35, "nextResetTime": 1735689600000u64}
            ]}
        })
    }

    #[test]
    fn tokens_limit_is_primary_and_time_limit_secondary() {
        let snapshot = normalize_quota_body(&quota_body(), 1).unwrap();
        let primary = snapshot.primary.unwrap();
        assert_eq!(primary.used_percent, 35.0);
        assert_eq!(primary.resets_at, Some(1_735_689_600));
        assert_eq!(snapshot.secondary.unwrap().used_percent, 12.0);

        let Some(QuotaExtension::Zai(quota)) = snapshot.quota.as_ref() else {
            panic!("expected zai quota");
        };
        assert_eq!(quota.limits.len(), 2);
        assert_eq!(quota.limits[1].resets_at, Some(1_735_689_600));
    }

    #[test]
    fn empty_limits_decline() {
        assert!(normalize_quota_body(&json!({"data": {"limits": []}}), 1).is_none());
        assert!(normalize_quota_body(&json!({"code": 401, "msg": "bad key"}), 1).is_none());
    }

    #[tokio::test]
    async fn fetch_uses_configured_endpoint_and_raw_key() {
        use axum::{http::HeaderMap, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

        let app = Router::new().route(
            "/api/monitor/usage/quota/limit",
            get(|headers: HeaderMap| async move {
                if headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("zai-key") {
                    Json(quota_body()).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = UsageSettings {
            zai_endpoint: Some(format!("http://{addr}/")),
            ..Default::default()
        };
        let ctx = FetchContext::new(reqwest::Client::new(), settings);
        let credential = ProviderCredential::ApiKey(ApiKeyCredential {
            key: "zai-key".to_string(),
        });
        let snapshot = ZaiUsageProvider
            .fetch_usage(&ctx, Some(&credential))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.provider, ProviderId::Zai);

        let wrong = ProviderCredential::ApiKey(ApiKeyCredential {
            key: "other".to_string(),
        });
        assert!(ZaiUsageProvider.fetch_usage(&ctx, Some(&wrong)).await.is_err());
    }
}
