mod support;

use aio_usage::domain::credentials::ProviderId;
use aio_usage::infra::credential_store::CredentialStore;
use aio_usage::infra::settings::UsageSettings;
use aio_usage::providers::adapters::{
    anthropic::AnthropicUsageProvider, codex::CodexUsageProvider, copilot::CopilotUsageProvider,
    proxy::ProxyUsageProvider,
};
use aio_usage::providers::{ProviderRegistry, UsageProvider};
use aio_usage::usage::{resolve_provider_filter, CollectOptions, UsageCollector};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

fn codex_usage_body() -> serde_json::Value {
    json!({
        "plan_type": "pro",
        "rate_limit": {
            "primary_window": {"used_percent": 12.0, "limit_window_seconds": 18000, "reset_at": 1900000000},
            "secondary_window": {"used_percent": 40.0, "limit_window_seconds": 604800, "reset_after_seconds": 3600}
        },
        "credits": {"has_credits": false, "unlimited": false, "balance": null}
    })
}

fn proxy_stats_body() -> serde_json::Value {
    json!({
        "data_source": "cache",
        "providers": {
            "antigravity": {
                "credential_count": 1,
                "active_count": 1,
                "quota_groups": {"claude": {"baseline": 100, "remaining": 25}},
                "credentials": []
            }
        }
    })
}

async fn upstream_mock() -> String {
    let app = Router::new()
        .route(
            "/wham/usage",
            get(|headers: HeaderMap| async move {
                let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
                let account = headers.get("chatgpt-account-id").and_then(|v| v.to_str().ok());
                if auth == Some("Bearer access-main") && account == Some("acct-main") {
                    Json(codex_usage_body()).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
        .route("/v1/quota-stats", get(|| async { Json(proxy_stats_body()) }))
        .route(
            "/copilot_internal/user",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
    support::serve(app).await
}

fn registry(base: &str) -> ProviderRegistry {
    ProviderRegistry::from_providers(vec![
        Arc::new(CodexUsageProvider::with_usage_url(format!("{base}/wham/usage")))
            as Arc<dyn UsageProvider>,
        Arc::new(CopilotUsageProvider::with_api_base(base)),
        Arc::new(AnthropicUsageProvider::with_api_base(base)),
        Arc::new(ProxyUsageProvider),
    ])
}

fn settings(base: &str) -> UsageSettings {
    UsageSettings {
        endpoint: Some(base.to_string()),
        timeout: 2_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn file_store_to_snapshots_end_to_end() {
    let home = support::TestHome::new();
    home.write_codex_cli_auth(json!({
        "tokens": {"access_token": "access-main", "refresh_token": "refresh-main", "account_id": "acct-main"}
    }));
    let base = upstream_mock().await;

    let collector = UsageCollector::with_registry(registry(&base), reqwest::Client::new());
    let store: Arc<dyn CredentialStore> = Arc::new(home.store());
    let snapshots = collector
        .collect_snapshots(store, &settings(&base), &CollectOptions::default())
        .await
        .expect("collection never fails on provider errors");

    let by_id = |id: ProviderId| {
        let matching: Vec<_> = snapshots.iter().filter(|s| s.provider == id).collect();
        assert_eq!(matching.len(), 1, "expected exactly one {id} snapshot");
        matching[0].clone()
    };

    let codex = by_id(ProviderId::Codex);
    assert!(!codex.is_missing);
    assert_eq!(codex.account_label.as_deref(), Some("openai"));
    assert_eq!(codex.plan_type.as_deref(), Some("pro"));
    assert_eq!(codex.primary.as_ref().unwrap().window_minutes, Some(300));

    let proxy = by_id(ProviderId::Proxy);
    assert!(!proxy.is_missing);
    assert_eq!(proxy.primary.as_ref().unwrap().used_percent, 75.0);

    let anthropic = by_id(ProviderId::Anthropic);
    assert!(anthropic.is_missing);
    assert!(anthropic
        .missing_details
        .iter()
        .any(|d| d.starts_with("Auth paths checked: ")));

    // No stored Copilot token and no side-channel token: attempted, nothing to report.
    assert!(by_id(ProviderId::Copilot).is_missing);
}

#[tokio::test]
async fn filter_alias_and_toggles_shape_the_report() {
    let home = support::TestHome::new();
    home.write_codex_cli_auth(json!({
        "tokens": {"access_token": "access-main", "account_id": "acct-main"}
    }));
    let base = upstream_mock().await;
    let collector = UsageCollector::with_registry(registry(&base), reqwest::Client::new());

    let options = CollectOptions {
        filter: resolve_provider_filter("ChatGPT"),
        include_all_accounts: false,
    };
    let snapshots = collector
        .collect_snapshots(Arc::new(home.store()), &settings(&base), &options)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].provider, ProviderId::Codex);

    let mut disabled = settings(&base);
    disabled.providers.insert("proxy".to_string(), false);
    disabled.providers.insert("openai".to_string(), false);
    let snapshots = collector
        .collect_snapshots(Arc::new(home.store()), &disabled, &CollectOptions::default())
        .await
        .unwrap();
    assert!(snapshots
        .iter()
        .all(|s| s.provider != ProviderId::Codex && s.provider != ProviderId::Proxy));
}

#[tokio::test]
async fn snapshots_serialize_as_camel_case_json() {
    let home = support::TestHome::new();
    let base = upstream_mock().await;
    let collector = UsageCollector::with_registry(registry(&base), reqwest::Client::new());

    let snapshots = collector
        .collect_snapshots(Arc::new(home.store()), &settings(&base), &CollectOptions::default())
        .await
        .unwrap();
    let value = serde_json::to_value(&snapshots).unwrap();
    let codex = value
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["provider"] == "codex")
        .unwrap();
    assert_eq!(codex["isMissing"], true);
    assert!(codex["missingReason"].as_str().unwrap().contains("codex login"));
}
