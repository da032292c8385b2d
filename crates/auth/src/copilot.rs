//! GitHub Copilot device code authorization and credential exchange payloads.
//!
//! Implements the OAuth 2.0 Device Authorization Grant used by GitHub Copilot.
//! No local callback port is needed for this flow. All functions here are
//! pure; the I/O lives in [`crate::flow`] and [`crate::session`].

use freegpt_types::{Credential, GatewayError, traits::Result};
use serde_json::Value;

/// OAuth scopes requested during authorization.
pub const SCOPES: &[&str] = &["read:user"];

/// Grant type sent while polling the token endpoint.
pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

// Header values matching the VS Code Copilot Chat extension.
pub const USER_AGENT: &str = "GitHubCopilotChat/0.35.0";
pub const EDITOR_VERSION: &str = "vscode/1.107.0";
pub const PLUGIN_VERSION: &str = "copilot-chat/0.35.0";

/// Parsed response from the device code request.
#[derive(Debug)]
pub struct DeviceCodeResponse {
    /// Unique device verification code.
    pub device_code: String,
    /// Short code the user enters at the verification URI.
    pub user_code: String,
    /// URL where the user authorizes the device.
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum polling interval in seconds.
    pub interval: u64,
}

/// Parse the device code endpoint JSON response.
///
/// # Errors
///
/// Returns an error if `device_code` or `user_code` is missing.
pub fn parse_device_code_response(json: &Value) -> Result<DeviceCodeResponse> {
    Ok(DeviceCodeResponse {
        device_code: json
            .get("device_code")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Auth("missing device_code".into()))?
            .to_string(),
        user_code: json
            .get("user_code")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Auth("missing user_code".into()))?
            .to_string(),
        verification_uri: json
            .get("verification_uri")
            .and_then(Value::as_str)
            .unwrap_or("https://github.com/login/device")
            .to_string(),
        expires_in: json
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(900),
        interval: json.get("interval").and_then(Value::as_u64).unwrap_or(5),
    })
}

/// What one poll of the token endpoint told us.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user has not finished yet.
    Pending,
    /// Poll less often.
    SlowDown,
    /// Authorization completed; carries the Grant.
    Granted(String),
}

/// Classify a token endpoint response during device polling.
///
/// # Errors
///
/// Returns an error for terminal OAuth errors (`expired_token`,
/// `access_denied`, ...) or when neither an error nor `access_token` is present.
pub fn parse_poll_response(json: &Value) -> Result<PollOutcome> {
    match json.get("error").and_then(Value::as_str) {
        Some("authorization_pending") => return Ok(PollOutcome::Pending),
        Some("slow_down") => return Ok(PollOutcome::SlowDown),
        Some(e) => return Err(GatewayError::Auth(format!("device flow error: {e}"))),
        None => {}
    }
    parse_token_response(json).map(PollOutcome::Granted)
}

/// Extract the Grant (`access_token`) from a token endpoint response.
///
/// GitHub may return form-encoded or JSON responses; this handles the JSON
/// format. Grants have no expiration time.
///
/// # Errors
///
/// Returns an error if the response is missing the `access_token` field.
pub fn parse_token_response(json: &Value) -> Result<String> {
    json.get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Auth("missing access_token".into()))
}

/// Parse the Grant → Credential exchange response.
///
/// `endpoints.api`, when present, replaces `default_api_base`.
///
/// # Errors
///
/// Returns an error if the response has no `token`.
pub fn parse_credential_response(json: &Value, default_api_base: &str) -> Result<Credential> {
    let token = json
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Auth("missing token in Copilot response".into()))?;

    let api_base = json
        .pointer("/endpoints/api")
        .and_then(Value::as_str)
        .unwrap_or(default_api_base);

    let credential = Credential::new(token, api_base);
    Ok(match json.get("expires_at").and_then(Value::as_u64) {
        Some(ts) if ts > 0 => credential.with_expires_at(ts),
        _ => credential,
    })
}
