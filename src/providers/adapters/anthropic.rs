//! Usage: Anthropic (Claude subscription) usage integration.
//!
//! - Windows via `api.anthropic.com/api/oauth/usage`
//! - Plan tier via `/api/oauth/profile` (best effort; failures do not drop the snapshot)

use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::quota::{
    AnthropicExtraUsage, AnthropicLimit, AnthropicQuota, AnthropicSubscription, QuotaExtension,
};
use crate::domain::snapshot::{clamp_percent, RateLimitWindow, UsageSnapshot};
use crate::providers::provider_trait::{read_json_response, FetchContext, FetchFuture, UsageProvider};
use crate::shared::error::AppResult;
use crate::shared::time::parse_reset_time;
use serde_json::{Map, Value};

const ANTHROPIC_API_BASE_URL: &str = "https://api.anthropic.com";
const BETA_HEADER: &str = "oauth-2025-04-20";
const USER_AGENT: &str = "claude-code/2.0.32";
const FIVE_HOUR_MINUTES: i64 = 300;
const SEVEN_DAY_MINUTES: i64 = 10_080;

const KNOWN_LIMITS: &[(&str, &str)] = &[
    ("five_hour", "5-Hour"),
    ("seven_day", "7-Day (All)"),
    ("seven_day_oauth_apps", "7-Day (OAuth Apps)"),
    ("seven_day_sonnet", "7-Day (Sonnet)"),
    ("seven_day_opus", "7-Day (Opus)"),
    ("seven_day_cowork", "7-Day (Co-work)"),
];

pub struct AnthropicUsageProvider {
    api_base: String,
}

impl Default for AnthropicUsageProvider {
    fn default() -> Self {
        Self::with_api_base(ANTHROPIC_API_BASE_URL)
    }
}

impl AnthropicUsageProvider {
    pub fn with_api_base(base: impl Into<String>) -> Self {
        Self {
            api_base: base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, ctx: &FetchContext, path: &str, token: &str) -> AppResult<Value> {
        let response = ctx
            .client
            .get(format!("{}{path}", self.api_base))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("anthropic-beta", BETA_HEADER)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: anthropic {path} request failed: {e}"))?;
        read_json_response(response, "anthropic usage").await
    }
}

fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|t| !t.is_empty())
        .map(|t| {
            let mut chars = t.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ordered_limit_keys(raw: &Map<String, Value>) -> Vec<&str> {
    let mut keys: Vec<&str> = KNOWN_LIMITS
        .iter()
        .map(|(k, _)| *k)
        .filter(|k| raw.contains_key(*k))
        .collect();
    keys.extend(
        raw.keys()
            .map(String::as_str)
            .filter(|k| !KNOWN_LIMITS.iter().any(|(known, _)| known == k)),
    );
    keys
}

fn extract_limits(raw: &Map<String, Value>) -> Vec<AnthropicLimit> {
    let mut limits = Vec::new();
    for key in ordered_limit_keys(raw) {
        if key == "extra_usage" {
            continue;
        }
        let Some(window) = raw.get(key).and_then(Value::as_object) else {
            continue;
        };
        if !window.contains_key("utilization") && !window.contains_key("resets_at") {
            continue;
        }
        let utilization = window
            .get("utilization")
            .and_then(Value::as_f64)
            .and_then(clamp_percent);
        let resets_at = window
            .get("resets_at")
            .and_then(Value::as_str)
            .and_then(parse_reset_time);
        if utilization.is_none() && resets_at.is_none() {
            continue;
        }
        let label = KNOWN_LIMITS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| humanize_key(key));
        limits.push(AnthropicLimit {
            key: key.to_string(),
            label,
            utilization: utilization.unwrap_or(0.0),
            resets_at,
        });
    }
    limits
}

fn extra_usage(raw: Option<&Value>) -> Option<AnthropicExtraUsage> {
    let rec = raw?.as_object()?;
    Some(AnthropicExtraUsage {
        is_enabled: rec.get("is_enabled").and_then(Value::as_bool) == Some(true),
        monthly_limit: value_text(rec.get("monthly_limit")),
        used_credits: value_text(rec.get("used_credits")),
        utilization: rec
            .get("utilization")
            .and_then(Value::as_f64)
            .and_then(clamp_percent),
    })
}

fn profile_str<'a>(profile: Option<&'a Value>, section: &str, key: &str) -> Option<&'a str> {
    profile?
        .get(section)?
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn profile_flag(profile: Option<&Value>, key: &str) -> bool {
    profile
        .and_then(|p| p.get("account"))
        .and_then(|a| a.get(key))
        .and_then(Value::as_bool)
        == Some(true)
}

pub fn infer_plan_type(profile: Option<&Value>) -> Option<String> {
    let org_type = profile_str(profile, "organization", "organization_type")
        .unwrap_or_default()
        .to_ascii_lowercase();
    let tier = profile_str(profile, "organization", "rate_limit_tier")
        .unwrap_or_default()
        .to_ascii_lowercase();

    let plan = if tier.contains("max_20") {
        "max_20x"
    } else if tier.contains("max_5") {
        "max_5x"
    } else if org_type.contains("max") {
        "max"
    } else if org_type.contains("enterprise") {
        "enterprise"
    } else if org_type.contains("team") {
        "team"
    } else if org_type.contains("pro") {
        "pro"
    } else if profile_flag(profile, "has_claude_max") {
        "max"
    } else if profile_flag(profile, "has_claude_pro") {
        "pro"
    } else {
        return None;
    };
    Some(plan.to_string())
}

/// Pure normalizer for the usage body plus optional profile body.
pub fn normalize_usage(usage: &Value, profile: Option<&Value>, now_secs: i64) -> Option<UsageSnapshot> {
    let raw = usage.as_object()?;
    let limits = extract_limits(raw);
    let extra = extra_usage(raw.get("extra_usage"));
    if limits.is_empty() && extra.is_none() {
        return None;
    }

    let window_for = |key: &str, minutes: i64| {
        limits
            .iter()
            .find(|l| l.key == key)
            .and_then(|l| RateLimitWindow::new(l.utilization, Some(minutes), l.resets_at))
    };

    let mut snapshot = UsageSnapshot::new(ProviderId::Anthropic, now_secs);
    snapshot.plan_type = infer_plan_type(profile);
    snapshot.primary = window_for("five_hour", FIVE_HOUR_MINUTES);
    snapshot.secondary = window_for("seven_day", SEVEN_DAY_MINUTES);
    snapshot.quota = Some(QuotaExtension::Anthropic(AnthropicQuota {
        limits,
        extra_usage: extra,
        subscription: AnthropicSubscription {
            organization_type: profile_str(profile, "organization", "organization_type")
                .map(str::to_string),
            rate_limit_tier: profile_str(profile, "organization", "rate_limit_tier")
                .map(str::to_string),
            subscription_status: profile_str(profile, "organization", "subscription_status")
                .map(str::to_string),
            has_claude_max: profile_flag(profile, "has_claude_max"),
            has_claude_pro: profile_flag(profile, "has_claude_pro"),
        },
    }));
    Some(snapshot)
}

impl UsageProvider for AnthropicUsageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn fetch_usage<'a>(
        &'a self,
        ctx: &'a FetchContext,
        credential: Option<&'a ProviderCredential>,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let Some(ProviderCredential::Anthropic(cred)) = credential else {
                return Ok(None);
            };

            let (usage, profile) = tokio::join!(
                self.get_json(ctx, "/api/oauth/usage", &cred.access),
                self.get_json(ctx, "/api/oauth/profile", &cred.access),
            );
            let usage = usage?;
            let profile = match profile {
                Ok(v) => Some(v),
                Err(err) => {
                    tracing::debug!("anthropic profile unavailable: {}", err);
                    None
                }
            };
            Ok(normalize_usage(&usage, profile.as_ref(), ctx.now_secs))
        })
    }
}
