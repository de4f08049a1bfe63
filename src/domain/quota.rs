//! Usage: Provider-specific quota extensions attached to a canonical snapshot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QuotaExtension {
    Copilot(CopilotQuota),
    Proxy(ProxyQuota),
    Zai(ZaiQuota),
    Anthropic(AnthropicQuota),
    OpenRouter(OpenRouterQuota),
}

/// `total == -1` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotQuota {
    pub remaining: i64,
    pub total: i64,
    pub percent_remaining: f64,
    pub reset_time: Option<String>,
    pub completions_remaining: Option<i64>,
    pub completions_total: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyQuotaGroup {
    pub name: String,
    pub remaining: f64,
    pub max: f64,
    pub remaining_percent: f64,
    pub resets_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyProviderQuota {
    pub name: String,
    pub credential_count: u64,
    pub active_count: u64,
    /// `true` when groups came from per-credential `5h` windows instead of provider groups.
    pub from_credential_windows: bool,
    pub groups: Vec<ProxyQuotaGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyQuota {
    pub providers: Vec<ProxyProviderQuota>,
    pub total_credentials: u64,
    pub active_credentials: u64,
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZaiLimit {
    pub kind: String,
    pub usage: f64,
    pub current_value: f64,
    pub remaining: f64,
    pub percentage: f64,
    pub resets_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZaiQuota {
    pub limits: Vec<ZaiLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicLimit {
    pub key: String,
    pub label: String,
    pub utilization: f64,
    pub resets_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicExtraUsage {
    pub is_enabled: bool,
    pub monthly_limit: Option<String>,
    pub used_credits: Option<String>,
    pub utilization: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicSubscription {
    pub organization_type: Option<String>,
    pub rate_limit_tier: Option<String>,
    pub subscription_status: Option<String>,
    pub has_claude_max: bool,
    pub has_claude_pro: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicQuota {
    pub limits: Vec<AnthropicLimit>,
    pub extra_usage: Option<AnthropicExtraUsage>,
    pub subscription: AnthropicSubscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRouterQuota {
    pub limit: Option<f64>,
    pub usage: f64,
    pub limit_remaining: Option<f64>,
    pub usage_daily: f64,
    pub usage_weekly: f64,
    pub usage_monthly: f64,
    pub is_free_tier: bool,
}
