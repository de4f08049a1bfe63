//! Usage: Unified error model (`CODE: message` strings) plus the usage-domain error taxonomy.

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failures that callers are expected to branch on.
///
/// Everything below a whole aggregation request is recovered locally; these are the errors that
/// escape a single workflow (device login, rotation, refresh, config load).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// Device/token endpoint unreachable, non-success status, or malformed body.
    #[error("authorization server error: {0}")]
    AuthServer(String),
    /// Explicit upstream rejection of a device authorization.
    #[error("Device flow failed: {0}")]
    DeviceFlowDenied(String),
    /// Refresh-token exchange failed; the prior credential is still valid to use as-is.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("Order number {order} is out of range (1-{total})")]
    OutOfRangeSelection { order: usize, total: usize },
    #[error("no accounts available to rotate between")]
    NoAccounts,
    #[error("invalid usage config: {0}")]
    InvalidConfig(String),
}

impl UsageError {
    pub fn code(&self) -> &'static str {
        match self {
            UsageError::AuthServer(_) => "AUTH_SERVER_ERROR",
            UsageError::DeviceFlowDenied(_) => "DEVICE_FLOW_DENIED",
            UsageError::RefreshFailed(_) => "REFRESH_FAILED",
            UsageError::OutOfRangeSelection { .. } => "OUT_OF_RANGE_SELECTION",
            UsageError::NoAccounts => "NO_ACCOUNTS",
            UsageError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

impl From<UsageError> for AppError {
    fn from(value: UsageError) -> Self {
        AppError::new(value.code(), value.to_string())
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new("INTERNAL_ERROR", value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}
