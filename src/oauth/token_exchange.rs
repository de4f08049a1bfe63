//! Usage: OAuth token endpoint helpers (refresh_token grant, response parsing, JWT account claims).

use crate::shared::error::UsageError;
use crate::shared::security::mask_token;
use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;

/// Applied when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
const OPENAI_AUTH_CLAIM: &str = "https://api.openai.com/auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoint {
    pub token_url: String,
    pub client_id: String,
}

impl TokenEndpoint {
    pub fn codex() -> Self {
        Self {
            token_url: "https://auth.openai.com/oauth/token".to_string(),
            client_id: "app_EMoamEEZ73f0CkXaXp7hrann".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OAuthTokenSet {
    pub(crate) access_token: String,
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_in_secs: i64,
    pub(crate) id_token: Option<String>,
}

pub(crate) async fn refresh_access_token(
    client: &reqwest::Client,
    endpoint: &TokenEndpoint,
    refresh_token: &str,
) -> Result<OAuthTokenSet, UsageError> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", refresh_token.trim().to_string());
    form.insert("client_id", endpoint.client_id.trim().to_string());

    let response = client
        .post(endpoint.token_url.trim())
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| UsageError::RefreshFailed(format!("refresh request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| UsageError::RefreshFailed(format!("refresh response read failed: {e}")))?;

    parse_token_response(status, &body)
}

pub(crate) fn parse_token_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<OAuthTokenSet, UsageError> {
    if !status.is_success() {
        let (error_code, error_message) = parse_oauth_error_details(body);
        let mut msg = format!("token endpoint returned status={}", status.as_u16());
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        msg.push_str(" body=");
        msg.push_str(sanitize_oauth_error_body_snippet(body).as_str());
        return Err(UsageError::RefreshFailed(msg));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| UsageError::RefreshFailed(format!("token response json invalid: {e}")))?;

    let access_token = string_field(&value, "access_token").ok_or_else(|| {
        UsageError::RefreshFailed("token response missing access_token".to_string())
    })?;

    let expires_in_secs = value
        .get("expires_in")
        .and_then(crate::domain::credentials::parse_i64_lossy)
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(OAuthTokenSet {
        access_token,
        refresh_token: string_field(&value, "refresh_token"),
        expires_in_secs,
        id_token: string_field(&value, "id_token"),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Decode the (unverified) payload segment of a JWT.
pub(crate) fn decode_jwt_claims(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub(crate) fn account_id_from_claims(claims: &Value) -> Option<String> {
    string_field(claims, "chatgpt_account_id")
        .or_else(|| {
            claims
                .get(OPENAI_AUTH_CLAIM)
                .and_then(|auth| string_field(auth, "chatgpt_account_id"))
        })
        .or_else(|| {
            claims
                .get("organizations")
                .and_then(Value::as_array)
                .and_then(|orgs| orgs.first())
                .and_then(|org| string_field(org, "id"))
        })
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc == "authorization"
        || key_lc == "device_code"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

pub(crate) fn sanitize_oauth_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let mut code = string_field(&value, "code");
    let mut message = string_field(&value, "error_description");

    if let Some(error_value) = value.get("error") {
        if let Some(err_str) = error_value.as_str() {
            if code.is_none() {
                code = Some(err_str.trim().to_string());
            }
        } else if error_value.is_object() {
            if code.is_none() {
                code = string_field(error_value, "code").or_else(|| string_field(error_value, "type"));
            }
            if message.is_none() {
                message = string_field(error_value, "message");
            }
        }
    }

    (code, message)
}
