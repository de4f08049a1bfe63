//! Usage: Interactive Copilot login (device flow -> persisted credential record).

use crate::domain::credentials::RawCredentialRecord;
use crate::infra::credential_store::CredentialStore;
use crate::oauth::device_flow::{DeviceAuthTransport, DeviceAuthorizationSession, DeviceFlow, Sleeper};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use std::sync::Arc;

/// Label the completed device-flow token is stored under.
pub const COPILOT_LOGIN_LABEL: &str = "github-copilot";

/// Runs the whole device flow. `prompt` receives the session once, before polling starts, so the
/// caller can show the verification URL and user code.
pub async fn login_with_device_flow<T, S, F>(
    flow: &DeviceFlow<T, S>,
    store: Arc<dyn CredentialStore>,
    prompt: F,
) -> AppResult<()>
where
    T: DeviceAuthTransport,
    S: Sleeper,
    F: FnOnce(&DeviceAuthorizationSession),
{
    let session = flow.request_device_session().await?;
    prompt(&session);

    let token = flow.poll_for_token(&session).await?;
    tracing::info!(token = %mask_token(&token), "copilot device login authorized");

    // The GitHub token does not expire on its own; `expires: 0` marks it as non-expiring.
    let record = RawCredentialRecord::oauth(token.clone(), Some(token), Some(0), None);
    blocking::run("copilot_login_save", move || {
        store.save_record(COPILOT_LOGIN_LABEL, &record)
    })
    .await
}
