//! Usage: Credential store collaborator (merged multi-file loading with diagnostics, single-record writes).

use crate::domain::credentials::{CredentialRecords, RawCredentialRecord};
use crate::infra::auth_paths::AuthPaths;
use crate::shared::error::{AppError, AppResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const ENV_CLAUDE_CODE_OAUTH_TOKEN: &str = "CLAUDE_CODE_OAUTH_TOKEN";
const ANTHROPIC_LABEL: &str = "anthropic";
const CODEX_CLI_LABEL: &str = "openai";

/// Everything read from the store for one aggregation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialLoad {
    pub records: CredentialRecords,
    /// Human-readable trail of what was probed; surfaced on missing placeholders.
    pub diagnostics: Vec<String>,
    /// Side-channel Copilot token written by the usage login flow.
    pub copilot_usage_token: Option<String>,
}

/// Callers must not run two writers against the same store concurrently.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> AppResult<CredentialLoad>;

    /// Writes every record in one update; either all labels change or none do.
    fn save_records(&self, records: &[(String, RawCredentialRecord)]) -> AppResult<()>;

    fn save_record(&self, label: &str, record: &RawCredentialRecord) -> AppResult<()> {
        self.save_records(&[(label.to_string(), record.clone())])
    }
}

pub struct FileCredentialStore {
    paths: AuthPaths,
    anthropic_env_token: Option<String>,
}

impl FileCredentialStore {
    pub fn new(paths: AuthPaths) -> Self {
        Self {
            paths,
            anthropic_env_token: None,
        }
    }

    pub fn discover() -> AppResult<Self> {
        let token = std::env::var(ENV_CLAUDE_CODE_OAUTH_TOKEN)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self::new(AuthPaths::discover()?).with_anthropic_env_token(token))
    }

    pub fn with_anthropic_env_token(mut self, token: Option<String>) -> Self {
        self.anthropic_env_token = token;
        self
    }

    pub fn paths(&self) -> &AuthPaths {
        &self.paths
    }
}

enum FileRead {
    Missing,
    Object(serde_json::Map<String, Value>),
    Rejected(String),
}

fn read_json_object(path: &Path) -> FileRead {
    if !path.exists() {
        return FileRead::Missing;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => {
            return FileRead::Rejected(format!(
                "Failed to read auth file {}: {e}",
                path.display()
            ))
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => FileRead::Object(map),
        Ok(_) => FileRead::Rejected(format!("Auth file is not a JSON object: {}", path.display())),
        Err(e) => FileRead::Rejected(format!(
            "Failed to parse auth file {}: {e}",
            path.display()
        )),
    }
}

fn merge_record_map(
    map: serde_json::Map<String, Value>,
    path: &Path,
    merged: &mut CredentialRecords,
    diagnostics: &mut Vec<String>,
) {
    for (label, value) in map {
        match serde_json::from_value::<RawCredentialRecord>(value) {
            Ok(record) => {
                merged.insert(label, record);
            }
            Err(_) => diagnostics.push(format!(
                "Skipped malformed auth entry '{label}' in {}",
                path.display()
            )),
        }
    }
    diagnostics.push(format!("Loaded auth from {}", path.display()));
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Codex CLI layout: `{"tokens": {"access_token", "refresh_token", "account_id"}}`.
fn parse_codex_cli_auth(map: &serde_json::Map<String, Value>) -> Option<RawCredentialRecord> {
    let tokens = map.get("tokens")?;
    let access = str_field(tokens, "access_token")?;
    Some(RawCredentialRecord::oauth(
        access,
        str_field(tokens, "refresh_token").map(str::to_string),
        None,
        str_field(tokens, "account_id").map(str::to_string),
    ))
}

/// Claude Code layout: `{"claudeAiOauth": {"accessToken", "refreshToken", "expiresAt"}}`.
fn parse_claude_code_credentials(
    map: &serde_json::Map<String, Value>,
) -> Option<RawCredentialRecord> {
    let oauth = map.get("claudeAiOauth")?;
    let access = str_field(oauth, "accessToken")?;
    Some(RawCredentialRecord::oauth(
        access,
        str_field(oauth, "refreshToken").map(str::to_string),
        oauth
            .get("expiresAt")
            .and_then(crate::domain::credentials::parse_i64_lossy),
        None,
    ))
}

fn read_usage_token(path: &Path) -> Option<String> {
    match read_json_object(path) {
        FileRead::Object(map) => map
            .get("token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        FileRead::Missing => None,
        FileRead::Rejected(reason) => {
            tracing::warn!("ignoring copilot usage token file: {}", reason);
            None
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> AppResult<CredentialLoad> {
        let mut merged = CredentialRecords::new();
        let listed: Vec<String> = self
            .paths
            .auth_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let mut diagnostics = vec![format!("Auth paths checked: {}", listed.join(", "))];

        // Lowest priority first so that higher-priority files overwrite shared labels.
        for path in self.paths.auth_files.iter().rev() {
            let map = match read_json_object(path) {
                FileRead::Missing => {
                    diagnostics.push(format!("Missing auth file: {}", path.display()));
                    continue;
                }
                FileRead::Rejected(reason) => {
                    diagnostics.push(reason);
                    continue;
                }
                FileRead::Object(map) => map,
            };

            if *path == self.paths.codex_auth_file {
                match parse_codex_cli_auth(&map) {
                    Some(record) => {
                        merged.insert(CODEX_CLI_LABEL.to_string(), record);
                        diagnostics.push(format!("Codex CLI auth loaded from {}", path.display()));
                    }
                    None => diagnostics.push(format!("Invalid Codex auth in {}", path.display())),
                }
                continue;
            }

            merge_record_map(map, path, &mut merged, &mut diagnostics);
        }

        if !merged.contains_key(ANTHROPIC_LABEL) {
            for path in &self.paths.claude_credential_files {
                if let FileRead::Object(map) = read_json_object(path) {
                    if let Some(record) = parse_claude_code_credentials(&map) {
                        merged.insert(ANTHROPIC_LABEL.to_string(), record);
                        diagnostics.push(format!(
                            "Claude Code credentials loaded from {}",
                            path.display()
                        ));
                        break;
                    }
                }
            }
        }

        if let Some(token) = self.anthropic_env_token.as_deref() {
            merged.insert(
                ANTHROPIC_LABEL.to_string(),
                RawCredentialRecord::oauth(token, None, None, None),
            );
            diagnostics.push(format!("Using {ENV_CLAUDE_CODE_OAUTH_TOKEN} for anthropic"));
        }

        let copilot_usage_token = read_usage_token(&self.paths.copilot_usage_token_file());

        tracing::debug!(
            records = merged.len(),
            has_copilot_usage_token = copilot_usage_token.is_some(),
            "credential store loaded"
        );

        Ok(CredentialLoad {
            records: merged,
            diagnostics,
            copilot_usage_token,
        })
    }

    fn save_records(&self, records: &[(String, RawCredentialRecord)]) -> AppResult<()> {
        let path = self.paths.writable_auth_file();
        let mut root = match read_json_object(&path) {
            FileRead::Missing => serde_json::Map::new(),
            FileRead::Object(map) => map,
            // Never clobber a file we could not understand.
            FileRead::Rejected(reason) => return Err(format!("SYSTEM_ERROR: {reason}").into()),
        };

        for (label, record) in records {
            let value = serde_json::to_value(record)
                .map_err(|e| format!("SYSTEM_ERROR: failed to encode credential record: {e}"))?;
            root.insert(label.clone(), value);
        }

        let encoded = serde_json::to_vec_pretty(&Value::Object(root))
            .map_err(|e| format!("SYSTEM_ERROR: failed to encode auth file: {e}"))?;
        write_atomically(&path, &encoded)?;

        let labels: Vec<&str> = records.iter().map(|(label, _)| label.as_str()).collect();
        tracing::info!(
            labels = %labels.join(","),
            path = %path.display(),
            "credential records saved"
        );
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create {}: {e}", parent.display()))?;
    }
    let tmp: PathBuf = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| format!("SYSTEM_ERROR: failed to write {}: {e}", tmp.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        AppError::with_source(
            "SYSTEM_ERROR",
            format!("failed to replace {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

/// In-process store for hosts that keep credentials elsewhere.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<CredentialLoad>,
}

impl MemoryCredentialStore {
    pub fn new(records: CredentialRecords) -> Self {
        Self::from_load(CredentialLoad {
            records,
            ..Default::default()
        })
    }

    pub fn from_load(load: CredentialLoad) -> Self {
        Self {
            state: Mutex::new(load),
        }
    }

    pub fn record(&self, label: &str) -> Option<RawCredentialRecord> {
        self.state().records.get(label).cloned()
    }

    /// A writer that panicked mid-save leaves at most a partial batch; keep serving it.
    fn state(&self) -> MutexGuard<'_, CredentialLoad> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("memory credential store lock poisoned; continuing with current records");
            poisoned.into_inner()
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> AppResult<CredentialLoad> {
        Ok(self.state().clone())
    }

    fn save_records(&self, records: &[(String, RawCredentialRecord)]) -> AppResult<()> {
        let mut state = self.state();
        for (label, record) in records {
            state.records.insert(label.clone(), record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
