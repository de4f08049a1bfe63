//! Usage: Local quota proxy integration (`{endpoint}/v1/quota-stats`).
//!
//! The proxy fronts several upstream model providers; each reports either provider-level
//! quota groups or per-credential rolling windows. Both are folded into `ProxyQuota` and the
//! most exhausted group becomes the snapshot's primary window.

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::quota::{ProxyProviderQuota, ProxyQuota, ProxyQuotaGroup, QuotaExtension};
use crate::domain::snapshot::{RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{read_json_response, FetchContext, FetchFuture, UsageProvider};
use crate::shared::time::parse_reset_time;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const CREDENTIAL_WINDOW: &str = "5h";
const CREDENTIAL_WINDOW_MINUTES: i64 = 300;

/// Provider-level group name -> display group. Several upstream names share a display group;
/// the first one seen wins.
const GROUP_MAPPING: &[(&str, &str)] = &[
    ("claude", "claude"),
    ("g3-pro", "g3-pro"),
    ("g3-flash", "g3-fla"),
    ("pro", "g3-pro"),
    ("3-flash", "g3-fla"),
];

pub struct ProxyUsageProvider;

#[derive(Debug, Deserialize)]
struct RawQuotaGroup {
    #[serde(default)]
    baseline: Option<f64>,
    #[serde(default)]
    remaining: f64,
    #[serde(default)]
    resets_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWindow {
    #[serde(default)]
    limit: Option<f64>,
    #[serde(default)]
    remaining: f64,
    #[serde(default)]
    reset_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCredential {
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    windows: BTreeMap<String, RawWindow>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(default)]
    credential_count: u64,
    #[serde(default)]
    active_count: u64,
    #[serde(default)]
    quota_groups: Option<BTreeMap<String, RawQuotaGroup>>,
    #[serde(default)]
    credentials: Vec<RawCredential>,
}

#[derive(Debug, Deserialize)]
struct QuotaStatsResponse {
    providers: BTreeMap<String, RawProvider>,
    #[serde(default)]
    data_source: Option<String>,
}

fn remaining_percent(remaining: f64, max: f64) -> f64 {
    if max > 0.0 {
        (remaining / max * 100.0).round()
    } else {
        0.0
    }
}

fn mapped_group_name(raw: &str) -> Option<&'static str> {
    GROUP_MAPPING
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, mapped)| *mapped)
}

fn groups_from_provider(groups: &BTreeMap<String, RawQuotaGroup>) -> Vec<ProxyQuotaGroup> {
    let mut out: Vec<ProxyQuotaGroup> = Vec::new();
    for (raw_name, group) in groups {
        let Some(name) = mapped_group_name(raw_name) else {
            continue;
        };
        let max = group.baseline.unwrap_or(0.0);
        let mapped = ProxyQuotaGroup {
            name: name.to_string(),
            remaining: group.remaining,
            max,
            remaining_percent: remaining_percent(group.remaining, max),
            resets_at: group.resets_at.as_deref().and_then(parse_reset_time),
        };
        // Later keys overwrite earlier ones but keep the first key's position.
        match out.iter_mut().find(|g| g.name == name) {
            Some(existing) => *existing = mapped,
            None => out.push(mapped),
        }
    }
    out
}

fn groups_from_credentials(credentials: &[RawCredential]) -> Vec<ProxyQuotaGroup> {
    let mut by_tier: Vec<ProxyQuotaGroup> = Vec::new();
    for credential in credentials {
        let Some(window) = credential.windows.get(CREDENTIAL_WINDOW) else {
            continue;
        };
        let tier = credential
            .tier
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("default");
        let reset = window.reset_at.as_deref().and_then(parse_reset_time);
        let limit = window.limit.unwrap_or(0.0);

        match by_tier.iter_mut().find(|g| g.name == tier) {
            Some(existing) => {
                existing.remaining += window.remaining;
                existing.max += limit;
                existing.resets_at = match (existing.resets_at, reset) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            None => by_tier.push(ProxyQuotaGroup {
                name: tier.to_string(),
                remaining: window.remaining,
                max: limit,
                remaining_percent: 0.0,
                resets_at: reset,
            }),
        }
    }
    for group in &mut by_tier {
        group.remaining_percent = remaining_percent(group.remaining, group.max);
    }
    by_tier
}

/// Pure normalizer for the `/v1/quota-stats` body.
pub fn normalize_quota_stats(body: &Value, now_secs: i64) -> Option<UsageSnapshot> {
    let parsed: QuotaStatsResponse = serde_json::from_value(body.clone()).ok()?;

    let mut providers = Vec::with_capacity(parsed.providers.len());
    let mut total_credentials = 0;
    let mut active_credentials = 0;
    for (name, provider) in &parsed.providers {
        total_credentials += provider.credential_count;
        active_credentials += provider.active_count;

        let provider_groups = provider
            .quota_groups
            .as_ref()
            .map(groups_from_provider)
            .unwrap_or_default();
        let (groups, from_credential_windows) = if provider_groups.is_empty() {
            (groups_from_credentials(&provider.credentials), true)
        } else {
            (provider_groups, false)
        };
        providers.push(ProxyProviderQuota {
            name: name.clone(),
            credential_count: provider.credential_count,
            active_count: provider.active_count,
            from_credential_windows,
            groups,
        });
    }

    let tightest = providers
        .iter()
        .flat_map(|p| p.groups.iter().map(move |g| (p.from_credential_windows, g)))
        .filter(|(_, g)| g.max > 0.0)
        .min_by(|(_, a), (_, b)| a.remaining_percent.total_cmp(&b.remaining_percent));

    let mut snapshot = UsageSnapshot::new(ProviderId::Proxy, now_secs);
    snapshot.primary = tightest.and_then(|(from_windows, group)| {
        RateLimitWindow::from_remaining_percent(
            group.remaining_percent,
            from_windows.then_some(CREDENTIAL_WINDOW_MINUTES),
            group.resets_at,
        )
    });
    snapshot.quota = Some(QuotaExtension::Proxy(ProxyQuota {
        providers,
        total_credentials,
        active_credentials,
        data_source: parsed.data_source,
    }));
    Some(snapshot)
}

pub(crate) fn quota_stats_url(endpoint: &str) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/quota-stats")
    } else {
        format!("{base}/v1/quota-stats")
    }
}

impl UsageProvider for ProxyUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Proxy
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        _credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let Some(endpoint) = ctx.settings.proxy_endpoint() else {
                return Err("CONFIG_MISSING: Proxy endpoint not configured. Set 'endpoint' in usage-config.json (default: http://localhost:8000)"
                    .to_string()
                    .into());
            };
            let mut request = ctx
                .client
                .get(quota_stats_url(endpoint))
                .header("Content-Type", "application/json");
            if let Some(api_key) = ctx.settings.proxy_api_key() {
                request = request.header("Authorization", format!("Bearer {api_key}"));
            }
            let response = request
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: proxy quota request failed: {e}"))?;
            let body = read_json_response(response, "proxy quota").await?;
            Ok(normalize_quota_stats(&body, ctx.now_secs))
        })
    }
}
