//! Usage: Usage-aggregation settings (schema + read helpers + sanitization).

use crate::domain::credentials::ProviderId;
use crate::shared::error::UsageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const MIN_FETCH_TIMEOUT_MS: u64 = 1_000;
pub const MAX_FETCH_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_ZAI_ENDPOINT: &str = "https://api.z.ai";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageSettings {
    /// Base URL of the local quota proxy.
    pub endpoint: Option<String>,
    /// Bearer key for the quota proxy.
    pub api_key: Option<String>,
    pub zai_endpoint: Option<String>,
    /// Per-provider fetch timeout in milliseconds.
    pub timeout: u64,
    /// Provider toggles; an absent key means enabled.
    pub providers: BTreeMap<String, bool>,
    pub log_level: String,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            zai_endpoint: None,
            timeout: DEFAULT_FETCH_TIMEOUT_MS,
            providers: BTreeMap::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl UsageSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(clamp_timeout_ms(self.timeout))
    }

    pub fn is_provider_enabled(&self, id: ProviderId) -> bool {
        self.providers
            .get(id.config_key())
            .or_else(|| self.providers.get(id.as_str()))
            .copied()
            .unwrap_or(true)
    }

    pub fn proxy_endpoint(&self) -> Option<&str> {
        trimmed(&self.endpoint)
    }

    pub fn proxy_api_key(&self) -> Option<&str> {
        trimmed(&self.api_key)
    }

    pub fn zai_base_url(&self) -> &str {
        trimmed(&self.zai_endpoint)
            .unwrap_or(DEFAULT_ZAI_ENDPOINT)
            .trim_end_matches('/')
    }
}

fn clamp_timeout_ms(value: u64) -> u64 {
    if value == 0 {
        return DEFAULT_FETCH_TIMEOUT_MS;
    }
    value.clamp(MIN_FETCH_TIMEOUT_MS, MAX_FETCH_TIMEOUT_MS)
}

/// Returns `true` when anything was repaired.
fn sanitize_settings(settings: &mut UsageSettings) -> bool {
    let mut changed = false;

    let timeout = clamp_timeout_ms(settings.timeout);
    if timeout != settings.timeout {
        settings.timeout = timeout;
        changed = true;
    }

    if settings.log_level.trim().is_empty() {
        settings.log_level = DEFAULT_LOG_LEVEL.to_string();
        changed = true;
    }

    for field in [
        &mut settings.endpoint,
        &mut settings.api_key,
        &mut settings.zai_endpoint,
    ] {
        if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
            *field = None;
            changed = true;
        }
    }

    changed
}

pub fn parse_settings_json(content: &str) -> Result<UsageSettings, UsageError> {
    if content.trim().is_empty() {
        return Ok(UsageSettings::default());
    }
    let mut settings: UsageSettings =
        serde_json::from_str(content).map_err(|e| UsageError::InvalidConfig(e.to_string()))?;
    if sanitize_settings(&mut settings) {
        tracing::debug!(timeout_ms = settings.timeout, "usage settings repaired on load");
    }
    Ok(settings)
}

/// A missing file yields defaults; an unreadable or unparsable file is an error.
pub fn read_from(path: &Path) -> Result<UsageSettings, UsageError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "usage settings file missing; using defaults");
        return Ok(UsageSettings::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        UsageError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_settings_json(&content).map_err(|e| match e {
        UsageError::InvalidConfig(reason) => {
            UsageError::InvalidConfig(format!("{}: {reason}", path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let settings = UsageSettings::default();
        for id in ProviderId::ALL {
            assert!(settings.is_provider_enabled(id));
        }
        assert_eq!(settings.fetch_timeout(), Duration::from_millis(10_000));
        assert_eq!(settings.zai_base_url(), DEFAULT_ZAI_ENDPOINT);
    }

    #[test]
    fn toggles_accept_config_key_and_provider_id() {
        let settings = parse_settings_json(
            r#"{"providers": {"openai": false, "zai-coding-plan": false, "proxy": true}}"#,
        )
        .unwrap();
        assert!(!settings.is_provider_enabled(ProviderId::Codex));
        assert!(!settings.is_provider_enabled(ProviderId::Zai));
        assert!(settings.is_provider_enabled(ProviderId::Proxy));
        assert!(settings.is_provider_enabled(ProviderId::Copilot));
    }

    #[test]
    fn sanitize_clamps_timeout_and_drops_blank_strings() {
        let settings =
            parse_settings_json(r#"{"timeout": 999999, "endpoint": "  ", "apiKey": "k"}"#).unwrap();
        assert_eq!(settings.timeout, MAX_FETCH_TIMEOUT_MS);
        assert_eq!(settings.endpoint, None);
        assert_eq!(settings.proxy_api_key(), Some("k"));

        let settings = parse_settings_json(r#"{"timeout": 5}"#).unwrap();
        assert_eq!(settings.fetch_timeout(), Duration::from_millis(MIN_FETCH_TIMEOUT_MS));

        let settings = parse_settings_json(r#"{"timeout": 0}"#).unwrap();
        assert_eq!(settings.timeout, DEFAULT_FETCH_TIMEOUT_MS);
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let err = parse_settings_json("{ not json").unwrap_err();
        assert!(matches!(err, UsageError::InvalidConfig(_)));
    }

    #[test]
    fn read_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_from(&dir.path().join("usage-config.json")).unwrap();
        assert_eq!(settings, UsageSettings::default());
    }

    #[test]
    fn zai_endpoint_trailing_slash_is_trimmed() {
        let settings = parse_settings_json(r#"{"zaiEndpoint": "https://open.bigmodel.cn/"}"#).unwrap();
        assert_eq!(settings.zai_base_url(), "https://open.bigmodel.cn");
    }
}
