//! Usage: Canonical usage snapshot shared by every provider integration.

use crate::domain::credentials::ProviderId;
use crate::domain::quota::QuotaExtension;
use crate::shared::time::normalize_epoch;
use serde::{Deserialize, Serialize};

pub fn clamp_percent(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    /// Always within `[0, 100]`.
    pub used_percent: f64,
    pub window_minutes: Option<i64>,
    /// Unix seconds.
    pub resets_at: Option<i64>,
}

impl RateLimitWindow {
    /// `None` when the percentage is not a finite number.
    pub fn new(used_percent: f64, window_minutes: Option<i64>, resets_at: Option<i64>) -> Option<Self> {
        Some(Self {
            used_percent: clamp_percent(used_percent)?,
            window_minutes: window_minutes.filter(|m| *m > 0),
            resets_at: resets_at.and_then(normalize_epoch),
        })
    }

    pub fn from_remaining_percent(
        remaining_percent: f64,
        window_minutes: Option<i64>,
        resets_at: Option<i64>,
    ) -> Option<Self> {
        let remaining = clamp_percent(remaining_percent)?;
        Self::new(100.0 - remaining, window_minutes, resets_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsSnapshot {
    pub has_credits: bool,
    pub unlimited: bool,
    pub balance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub provider: ProviderId,
    /// Capture time, Unix seconds.
    pub timestamp: i64,
    /// Label of the credential that produced this snapshot, when there was one.
    pub account_label: Option<String>,
    pub plan_type: Option<String>,
    pub primary: Option<RateLimitWindow>,
    pub secondary: Option<RateLimitWindow>,
    pub code_review: Option<RateLimitWindow>,
    pub credits: Option<CreditsSnapshot>,
    pub quota: Option<QuotaExtension>,
    pub is_missing: bool,
    pub missing_reason: Option<String>,
    pub missing_details: Vec<String>,
}

impl UsageSnapshot {
    pub fn new(provider: ProviderId, timestamp: i64) -> Self {
        Self {
            provider,
            timestamp,
            account_label: None,
            plan_type: None,
            primary: None,
            secondary: None,
            code_review: None,
            credits: None,
            quota: None,
            is_missing: false,
            missing_reason: None,
            missing_details: Vec::new(),
        }
    }

    pub fn missing(
        provider: ProviderId,
        timestamp: i64,
        reason: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            is_missing: true,
            missing_reason: Some(reason.into()),
            missing_details: details,
            ..Self::new(provider, timestamp)
        }
    }

    pub fn has_usage_data(&self) -> bool {
        self.primary.is_some()
            || self.secondary.is_some()
            || self.code_review.is_some()
            || self.credits.is_some()
            || self.quota.is_some()
    }

    #[cfg(test)]
    pub(crate) fn windows(&self) -> impl Iterator<Item = &RateLimitWindow> {
        [&self.primary, &self.secondary, &self.code_review]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_clamps_percent_and_normalizes_reset() {
        let window = RateLimitWindow::new(140.0, Some(300), Some(1_700_000_000_000)).unwrap();
        assert_eq!(window.used_percent, 100.0);
        assert_eq!(window.resets_at, Some(1_700_000_000));

        let window = RateLimitWindow::new(-3.0, Some(0), Some(0)).unwrap();
        assert_eq!(window.used_percent, 0.0);
        assert_eq!(window.window_minutes, None);
        assert_eq!(window.resets_at, None);

        assert!(RateLimitWindow::new(f64::NAN, None, None).is_none());
    }

    #[test]
    fn remaining_percent_is_inverted() {
        let window = RateLimitWindow::from_remaining_percent(75.0, None, None).unwrap();
        assert_eq!(window.used_percent, 25.0);
    }

    #[test]
    fn missing_snapshot_serializes_camel_case() {
        let snapshot = UsageSnapshot::missing(
            ProviderId::Codex,
            10,
            "no credential",
            vec!["Auth paths checked: /x".to_string()],
        );
        assert!(!snapshot.has_usage_data());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["provider"], "codex");
        assert_eq!(value["isMissing"], true);
        assert_eq!(value["missingReason"], "no credential");
        assert!(value["primary"].is_null());
    }
}
