//! Usage: OAuth device authorization flow (device-code request + explicit polling state machine).

use crate::shared::error::UsageError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub const GITHUB_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
pub const GITHUB_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const COPILOT_CLIENT_ID: &str = "Ov23li8tweQw6odWQebz";
pub const COPILOT_SCOPE: &str = "read:user";
/// Added to every sleep so the loop never polls faster than the server allows.
pub const POLL_SAFETY_MARGIN_SECS: u64 = 3;
pub const SLOW_DOWN_INCREMENT_SECS: u64 = 5;
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorizationSession {
    pub verification_uri: String,
    pub user_code: String,
    pub device_code: String,
    #[serde(rename = "interval")]
    pub poll_interval_secs: u64,
}

/// One token-endpoint answer. Every field is optional upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenPollResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
}

pub type DeviceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UsageError>> + Send + 'a>>;

/// Network seam of the flow. Implementations map transport failures, non-success statuses and
/// malformed bodies to `UsageError::AuthServer`.
pub trait DeviceAuthTransport: Send + Sync {
    fn request_device_code<'a>(
        &'a self,
        client_id: &'a str,
        scope: &'a str,
    ) -> DeviceFuture<'a, DeviceAuthorizationSession>;

    fn poll_token<'a>(
        &'a self,
        client_id: &'a str,
        device_code: &'a str,
    ) -> DeviceFuture<'a, TokenPollResponse>;
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

pub struct HttpDeviceAuthTransport {
    client: reqwest::Client,
    device_code_url: String,
    token_url: String,
}

impl HttpDeviceAuthTransport {
    pub fn github(client: reqwest::Client) -> Self {
        Self::new(client, GITHUB_DEVICE_CODE_URL, GITHUB_ACCESS_TOKEN_URL)
    }

    pub fn new(
        client: reqwest::Client,
        device_code_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            device_code_url: device_code_url.into(),
            token_url: token_url.into(),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
        what: &str,
    ) -> Result<T, UsageError> {
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UsageError::AuthServer(format!("{what} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UsageError::AuthServer(format!(
                "{what} returned status={}",
                status.as_u16()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| UsageError::AuthServer(format!("{what} response read failed: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| UsageError::AuthServer(format!("invalid {what} response: {e}")))
    }
}

impl DeviceAuthTransport for HttpDeviceAuthTransport {
    fn request_device_code<'a>(
        &'a self,
        client_id: &'a str,
        scope: &'a str,
    ) -> DeviceFuture<'a, DeviceAuthorizationSession> {
        Box::pin(async move {
            self.post_json(
                &self.device_code_url,
                serde_json::json!({ "client_id": client_id, "scope": scope }),
                "device authorization",
            )
            .await
        })
    }

    fn poll_token<'a>(
        &'a self,
        client_id: &'a str,
        device_code: &'a str,
    ) -> DeviceFuture<'a, TokenPollResponse> {
        Box::pin(async move {
            self.post_json(
                &self.token_url,
                serde_json::json!({
                    "client_id": client_id,
                    "device_code": device_code,
                    "grant_type": DEVICE_GRANT_TYPE,
                }),
                "device token",
            )
            .await
        })
    }
}

/// What a single poll response means for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollOutcome {
    Authorized(String),
    Pending,
    SlowDown(Option<u64>),
    Denied(String),
}

fn classify(response: TokenPollResponse) -> PollOutcome {
    if let Some(token) = response
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return PollOutcome::Authorized(token.to_string());
    }
    match response.error.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None | Some("authorization_pending") => PollOutcome::Pending,
        Some("slow_down") => PollOutcome::SlowDown(response.interval),
        Some(other) => PollOutcome::Denied(other.to_string()),
    }
}

pub struct DeviceFlow<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    client_id: String,
    scope: String,
}

impl DeviceFlow<HttpDeviceAuthTransport, TokioSleeper> {
    pub fn github_copilot(client: reqwest::Client) -> Self {
        Self::new(
            HttpDeviceAuthTransport::github(client),
            TokioSleeper,
            COPILOT_CLIENT_ID,
            COPILOT_SCOPE,
        )
    }
}

impl<T: DeviceAuthTransport, S: Sleeper> DeviceFlow<T, S> {
    pub fn new(
        transport: T,
        sleeper: S,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            client_id: client_id.into(),
            scope: scope.into(),
        }
    }

    pub async fn request_device_session(&self) -> Result<DeviceAuthorizationSession, UsageError> {
        let session = self
            .transport
            .request_device_code(&self.client_id, &self.scope)
            .await?;
        if session.device_code.trim().is_empty() || session.user_code.trim().is_empty() {
            return Err(UsageError::AuthServer(
                "device authorization response missing codes".to_string(),
            ));
        }
        tracing::info!(
            verification_uri = %session.verification_uri,
            interval_secs = session.poll_interval_secs,
            "device authorization started"
        );
        Ok(session)
    }

    /// Polls until the user authorizes or the server terminates the flow. There is no iteration
    /// cap; drop the future to abandon it.
    pub async fn poll_for_token(
        &self,
        session: &DeviceAuthorizationSession,
    ) -> Result<String, UsageError> {
        let mut interval_secs = session.poll_interval_secs;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let response = self
                .transport
                .poll_token(&self.client_id, &session.device_code)
                .await?;

            match classify(response) {
                PollOutcome::Authorized(token) => {
                    tracing::info!(attempts, "device authorization completed");
                    return Ok(token);
                }
                PollOutcome::Pending => {}
                PollOutcome::SlowDown(server_interval) => {
                    interval_secs = server_interval
                        .unwrap_or(interval_secs)
                        .saturating_add(SLOW_DOWN_INCREMENT_SECS);
                    tracing::debug!(interval_secs, "device authorization asked to slow down");
                }
                PollOutcome::Denied(reason) => {
                    tracing::warn!(attempts, reason = %reason, "device authorization denied");
                    return Err(UsageError::DeviceFlowDenied(reason));
                }
            }

            self.sleeper
                .sleep(Duration::from_secs(
                    interval_secs.saturating_add(POLL_SAFETY_MARGIN_SECS),
                ))
                .await;
        }
    }
}
