//! Usage: Provider descriptors and resolution of raw credential records into typed entries.
//!
//! Descriptors are static and read-only. `resolve` is a pure function over the record set:
//! - single-account providers take the first recognised label that has a record;
//! - the multi-account provider (codex) optionally expands to every OAuth-shaped label,
//!   deduplicated by identity fingerprint with explicitly named labels winning over fallbacks.

use crate::domain::credentials::{
    AccountIdentity, AnthropicCredential, ApiKeyCredential, CodexCredential, CopilotCredential,
    CredentialRecords, ProviderCredential, ProviderId, RawCredentialRecord,
};

pub struct ProviderDescriptor {
    pub id: ProviderId,
    /// Acceptable labels in priority order. For the multi-account provider these are the
    /// canonical fallback labels.
    pub labels: &'static [&'static str],
    pub requires_oauth: bool,
    pub multi_account: bool,
    pub build: fn(&RawCredentialRecord, &str) -> Option<ProviderCredential>,
}

/// Labels that never name a codex account even when the record looks OAuth-shaped.
const SYSTEM_LABELS: &[&str] = &[
    "version",
    "default",
    "current",
    "google",
    "gemini",
    "vertex",
    "amazon-bedrock",
    "azure",
    "xai",
    "groq",
    "deepseek",
    "mistral",
];

static DESCRIPTORS: [ProviderDescriptor; 5] = [
    ProviderDescriptor {
        id: ProviderId::Codex,
        labels: &["codex", "openai"],
        requires_oauth: true,
        multi_account: true,
        build: build_codex,
    },
    ProviderDescriptor {
        id: ProviderId::Copilot,
        labels: &["github-copilot", "github-copilot-enterprise", "copilot"],
        requires_oauth: true,
        multi_account: false,
        build: build_copilot,
    },
    ProviderDescriptor {
        id: ProviderId::Anthropic,
        labels: &["anthropic", "claude"],
        requires_oauth: true,
        multi_account: false,
        build: build_anthropic,
    },
    ProviderDescriptor {
        id: ProviderId::OpenRouter,
        labels: &["openrouter"],
        requires_oauth: false,
        multi_account: false,
        build: build_api_key,
    },
    ProviderDescriptor {
        id: ProviderId::Zai,
        labels: &["zai-coding-plan", "zai", "zhipuai-coding-plan"],
        requires_oauth: false,
        multi_account: false,
        build: build_api_key,
    },
];

pub fn descriptors() -> &'static [ProviderDescriptor] {
    &DESCRIPTORS
}

pub fn descriptor(id: ProviderId) -> Option<&'static ProviderDescriptor> {
    DESCRIPTORS.iter().find(|d| d.id == id)
}

/// Label under which the active codex account is stored.
pub const CURRENT_CODEX_LABEL: &str = "openai";

fn build_codex(record: &RawCredentialRecord, _label: &str) -> Option<ProviderCredential> {
    let access = record.access_token()?;
    Some(ProviderCredential::Codex(CodexCredential {
        access: access.to_string(),
        refresh: record.refresh_token().map(str::to_string),
        account_id: record.account().map(str::to_string),
        expires_at_ms: record.expires,
    }))
}

fn build_copilot(record: &RawCredentialRecord, _label: &str) -> Option<ProviderCredential> {
    let token = record.refresh_token().or_else(|| record.access_token())?;
    Some(ProviderCredential::Copilot(CopilotCredential {
        token: token.to_string(),
        enterprise_url: record.enterprise().map(str::to_string),
    }))
}

fn build_anthropic(record: &RawCredentialRecord, _label: &str) -> Option<ProviderCredential> {
    let access = record.access_token()?;
    Some(ProviderCredential::Anthropic(AnthropicCredential {
        access: access.to_string(),
        refresh: record.refresh_token().map(str::to_string),
        expires_at_ms: record.expires,
    }))
}

fn build_api_key(record: &RawCredentialRecord, _label: &str) -> Option<ProviderCredential> {
    let key = record.api_key().or_else(|| record.access_token())?;
    Some(ProviderCredential::ApiKey(ApiKeyCredential {
        key: key.to_string(),
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Expand the multi-account provider to every candidate account.
    pub include_all_accounts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub provider: ProviderId,
    pub label: String,
    pub credential: ProviderCredential,
}

pub fn resolve(records: &CredentialRecords, options: ResolveOptions) -> Vec<ResolvedEntry> {
    let mut entries = Vec::new();
    for descriptor in descriptors() {
        if descriptor.multi_account && options.include_all_accounts {
            entries.extend(resolve_all_accounts(records, descriptor));
            continue;
        }
        if let Some(entry) = resolve_single(records, descriptor) {
            entries.push(entry);
        }
    }
    entries
}

fn resolve_single(
    records: &CredentialRecords,
    descriptor: &ProviderDescriptor,
) -> Option<ResolvedEntry> {
    let (label, record) = descriptor
        .labels
        .iter()
        .find_map(|label| records.get(*label).map(|record| (*label, record)))?;

    if descriptor.requires_oauth && !record.has_oauth_compatible_type() {
        tracing::debug!(
            provider = %descriptor.id,
            label,
            record_type = record.declared_type().unwrap_or(""),
            "skipping credential with non-oauth type"
        );
        return None;
    }

    let credential = (descriptor.build)(record, label)?;
    Some(ResolvedEntry {
        provider: descriptor.id,
        label: label.to_string(),
        credential,
    })
}

fn is_reserved_label(label: &str, owner: &ProviderDescriptor) -> bool {
    let normalized = label.trim().to_ascii_lowercase();
    if normalized.is_empty() || normalized.starts_with('$') {
        return true;
    }
    if SYSTEM_LABELS.contains(&normalized.as_str()) {
        return true;
    }
    descriptors()
        .iter()
        .filter(|d| d.id != owner.id)
        .any(|d| d.labels.contains(&normalized.as_str()))
}

struct AccountCandidateSlot {
    fingerprint: String,
    is_fallback: bool,
    entry: ResolvedEntry,
}

fn resolve_all_accounts(
    records: &CredentialRecords,
    descriptor: &ProviderDescriptor,
) -> Vec<ResolvedEntry> {
    let mut slots: Vec<AccountCandidateSlot> = Vec::new();

    for (label, record) in records {
        let is_fallback = descriptor.labels.contains(&label.as_str());
        if is_fallback {
            if descriptor.requires_oauth && !record.has_oauth_compatible_type() {
                continue;
            }
        } else if is_reserved_label(label, descriptor) || !record.looks_oauth_shaped() {
            continue;
        }

        let Some(credential) = (descriptor.build)(record, label) else {
            continue;
        };
        let fingerprint = AccountIdentity::from_record(record).fingerprint();
        let entry = ResolvedEntry {
            provider: descriptor.id,
            label: label.clone(),
            credential,
        };

        match slots.iter_mut().find(|slot| slot.fingerprint == fingerprint) {
            Some(existing) => {
                if existing.is_fallback && !is_fallback {
                    existing.is_fallback = false;
                    existing.entry = entry;
                }
            }
            None => slots.push(AccountCandidateSlot {
                fingerprint,
                is_fallback,
                entry,
            }),
        }
    }

    slots.into_iter().map(|slot| slot.entry).collect()
}
