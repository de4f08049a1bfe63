//! Usage: Resolve credential/config file locations (supports $CODEX_HOME and XDG overrides).

use crate::shared::error::AppResult;
use std::path::{Path, PathBuf};

const ENV_CODEX_HOME: &str = "CODEX_HOME";
const ENV_XDG_DATA_HOME: &str = "XDG_DATA_HOME";
const ENV_XDG_CONFIG_HOME: &str = "XDG_CONFIG_HOME";
const ENV_APPDATA: &str = "APPDATA";
const APP_DIR_NAME: &str = "opencode";
const AUTH_FILE_NAME: &str = "auth.json";
const SETTINGS_FILE_NAME: &str = "usage-config.json";
const COPILOT_USAGE_TOKEN_FILE_NAME: &str = "copilot-usage-token.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

/// Environment inputs that influence path resolution.
#[derive(Debug, Clone, Default)]
pub struct PathEnv {
    pub codex_home: Option<String>,
    pub xdg_data_home: Option<String>,
    pub xdg_config_home: Option<String>,
    pub appdata: Option<String>,
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PathEnv {
    pub fn from_process() -> Self {
        Self {
            codex_home: env_value(ENV_CODEX_HOME),
            xdg_data_home: env_value(ENV_XDG_DATA_HOME),
            xdg_config_home: env_value(ENV_XDG_CONFIG_HOME),
            appdata: env_value(ENV_APPDATA),
        }
    }
}

fn expand_tilde(home: &Path, raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed == "~" {
        return Some(home.to_path_buf());
    }

    let rest = trimmed
        .strip_prefix("~/")
        .or_else(|| trimmed.strip_prefix("~\\"));

    rest.map(|suffix| home.join(suffix))
}

fn resolve_under_home(home: &Path, raw: &str) -> PathBuf {
    if let Some(p) = expand_tilde(home, raw) {
        return p;
    }

    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        return candidate;
    }

    home.join(candidate)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    /// Auth files in priority order (highest first).
    pub auth_files: Vec<PathBuf>,
    /// The Codex CLI auth file; parsed with its own layout.
    pub codex_auth_file: PathBuf,
    pub app_data_dir: PathBuf,
    pub settings_file: PathBuf,
    pub claude_credential_files: Vec<PathBuf>,
}

impl AuthPaths {
    pub fn discover() -> AppResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| "SYSTEM_ERROR: failed to resolve home dir".to_string())?;
        Ok(Self::resolve(&home, &PathEnv::from_process(), Platform::current()))
    }

    pub fn resolve(home: &Path, env: &PathEnv, platform: Platform) -> Self {
        let codex_home = match env.codex_home.as_deref() {
            Some(raw) => resolve_under_home(home, raw),
            None => home.join(".codex"),
        };
        let codex_auth_file = codex_home.join(AUTH_FILE_NAME);
        let roaming = || {
            env.appdata
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData").join("Roaming"))
        };
        let linux_data = home.join(".local").join("share").join(APP_DIR_NAME);
        let mac_support = home
            .join("Library")
            .join("Application Support")
            .join(APP_DIR_NAME);

        let mut auth_files: Vec<PathBuf> = Vec::new();
        let app_data_dir = match platform {
            Platform::MacOs => {
                // The CLI uses Linux-style data dirs on macOS too; Application Support is the fallback.
                auth_files.push(linux_data.join(AUTH_FILE_NAME));
                auth_files.push(mac_support.join(AUTH_FILE_NAME));
                mac_support
            }
            Platform::Windows => {
                let dir = roaming().join(APP_DIR_NAME);
                auth_files.push(dir.join(AUTH_FILE_NAME));
                dir
            }
            Platform::Linux => {
                let xdg = env
                    .xdg_data_home
                    .as_deref()
                    .map(|raw| PathBuf::from(raw).join(APP_DIR_NAME));
                if let Some(dir) = xdg.as_ref() {
                    auth_files.push(dir.join(AUTH_FILE_NAME));
                }
                auth_files.push(linux_data.join(AUTH_FILE_NAME));
                xdg.unwrap_or(linux_data)
            }
        };
        auth_files.push(codex_auth_file.clone());
        let mut seen = std::collections::HashSet::new();
        auth_files.retain(|p| seen.insert(p.clone()));

        let config_dir = match platform {
            Platform::Windows => roaming(),
            _ => env
                .xdg_config_home
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(".config")),
        };

        let claude_dir = home.join(".claude");

        Self {
            auth_files,
            codex_auth_file,
            app_data_dir,
            settings_file: config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME),
            claude_credential_files: vec![
                claude_dir.join(".credentials.json"),
                claude_dir.join("credentials.json"),
            ],
        }
    }

    pub fn copilot_usage_token_file(&self) -> PathBuf {
        self.app_data_dir.join(COPILOT_USAGE_TOKEN_FILE_NAME)
    }

    /// Where new records are written: the first existing non-Codex auth file, else the default.
    pub fn writable_auth_file(&self) -> PathBuf {
        self.auth_files
            .iter()
            .filter(|p| **p != self.codex_auth_file)
            .find(|p| p.exists())
            .cloned()
            .unwrap_or_else(|| self.app_data_dir.join(AUTH_FILE_NAME))
    }
}
