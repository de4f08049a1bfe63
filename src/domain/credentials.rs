//! Usage: Stored credential records (label -> loose field bag) and typed provider credentials.

use crate::shared::security::digest_parts;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Record `type` values treated as OAuth-compatible.
pub const OAUTH_RECORD_TYPES: &[&str] = &["oauth", "token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "copilot")]
    Copilot,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "zai-coding-plan")]
    Zai,
    #[serde(rename = "proxy")]
    Proxy,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Codex,
        ProviderId::Copilot,
        ProviderId::Anthropic,
        ProviderId::OpenRouter,
        ProviderId::Zai,
        ProviderId::Proxy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Codex => "codex",
            ProviderId::Copilot => "copilot",
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Zai => "zai-coding-plan",
            ProviderId::Proxy => "proxy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|id| id.as_str() == raw)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::Codex => "OpenAI Codex",
            ProviderId::Copilot => "GitHub Copilot",
            ProviderId::Anthropic => "Anthropic Claude",
            ProviderId::OpenRouter => "OpenRouter",
            ProviderId::Zai => "Z.ai GLM Coding Plan",
            ProviderId::Proxy => "Quota Proxy",
        }
    }

    /// Key used in the settings `providers` toggle map.
    pub fn config_key(self) -> &'static str {
        match self {
            ProviderId::Codex => "openai",
            ProviderId::Zai => "zai",
            other => other.as_str(),
        }
    }

    /// Core providers get an explicit placeholder when they produce nothing.
    pub fn is_core(self) -> bool {
        matches!(
            self,
            ProviderId::Codex | ProviderId::Copilot | ProviderId::Anthropic | ProviderId::Proxy
        )
    }

    /// Special providers are attempted once per aggregation even without a stored credential.
    pub fn is_special(self) -> bool {
        matches!(self, ProviderId::Copilot | ProviderId::Proxy)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored credential entry. Unknown fields are kept so rewrites do not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCredentialRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_url: Option<String>,
    /// Unix milliseconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lossy_i64"
    )]
    pub expires: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

pub type CredentialRecords = BTreeMap<String, RawCredentialRecord>;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RawCredentialRecord {
    pub fn oauth(
        access: impl Into<String>,
        refresh: Option<String>,
        expires: Option<i64>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            kind: Some("oauth".to_string()),
            access: Some(access.into()),
            refresh,
            account_id,
            expires,
            ..Self::default()
        }
    }

    pub fn declared_type(&self) -> Option<&str> {
        non_empty(&self.kind)
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh)
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.key)
    }

    pub fn account(&self) -> Option<&str> {
        non_empty(&self.account_id)
    }

    pub fn enterprise(&self) -> Option<&str> {
        non_empty(&self.enterprise_url)
    }

    /// An absent type is compatible; a present one must be an OAuth-like type.
    pub fn has_oauth_compatible_type(&self) -> bool {
        match self.declared_type() {
            None => true,
            Some(kind) => OAUTH_RECORD_TYPES
                .iter()
                .any(|accepted| kind.eq_ignore_ascii_case(accepted)),
        }
    }

    pub fn looks_oauth_shaped(&self) -> bool {
        self.has_oauth_compatible_type()
            && self.access_token().is_some()
            && self.refresh_token().is_some()
    }
}

pub(crate) fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn deserialize_lossy_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_i64_lossy))
}

/// Fields used to recognise the same underlying account across labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentity {
    pub account_id: Option<String>,
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub expires: Option<i64>,
}

impl AccountIdentity {
    pub fn from_record(record: &RawCredentialRecord) -> Self {
        Self {
            account_id: record.account().map(str::to_string),
            access: record
                .access_token()
                .or_else(|| record.api_key())
                .map(str::to_string),
            refresh: record.refresh_token().map(str::to_string),
            expires: record.expires,
        }
    }

    /// Equality key over `(accountId, access-or-key, refresh)`; kept in memory only.
    pub fn fingerprint(&self) -> String {
        digest_parts(&[
            self.account_id.as_deref().unwrap_or(""),
            self.access.as_deref().unwrap_or(""),
            self.refresh.as_deref().unwrap_or(""),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexCredential {
    pub access: String,
    pub refresh: Option<String>,
    pub account_id: Option<String>,
    /// Unix milliseconds.
    pub expires_at_ms: Option<i64>,
}

impl CodexCredential {
    pub fn identity(&self) -> AccountIdentity {
        AccountIdentity {
            account_id: self.account_id.clone(),
            access: Some(self.access.clone()),
            refresh: self.refresh.clone(),
            expires: self.expires_at_ms,
        }
    }

    pub fn to_record(&self) -> RawCredentialRecord {
        RawCredentialRecord::oauth(
            self.access.clone(),
            self.refresh.clone(),
            self.expires_at_ms,
            self.account_id.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopilotCredential {
    /// GitHub OAuth token (refresh preferred over access, they are usually identical).
    pub token: String,
    pub enterprise_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicCredential {
    pub access: String,
    pub refresh: Option<String>,
    pub expires_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCredential {
    Codex(CodexCredential),
    Copilot(CopilotCredential),
    Anthropic(AnthropicCredential),
    ApiKey(ApiKeyCredential),
}
