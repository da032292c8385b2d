//! Interactive device code login.
//!
//! This is a blocking, human-in-the-loop step: it prints a user code and
//! verification URL, then polls until the user finishes authorizing in a
//! browser. It is only ever started from an administrative entry point (the
//! `login` command or the background authorizer), never from a chat request.

use crate::copilot::{self, PollOutcome};
use freegpt_config::UpstreamConfig;
use freegpt_types::{GatewayError, traits::Result};
use std::time::Duration;

/// Extra seconds added to the polling interval on `slow_down`.
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Apply the short-call timeout from `upstream`, if any.
pub(crate) fn bounded(req: rquest::RequestBuilder, upstream: &UpstreamConfig) -> rquest::RequestBuilder {
    match upstream.request_timeout() {
        Some(t) => req.timeout(t),
        None => req,
    }
}

/// Run the device code flow and return the Grant.
///
/// The polling interval is the larger of the server-suggested interval and
/// `upstream.poll_interval_secs`.
///
/// # Errors
///
/// Returns an error on transport failures, unparseable responses, terminal
/// OAuth errors, or when the device code expires before the user finishes.
pub async fn device_login(
    http: &rquest::Client,
    upstream: &UpstreamConfig,
    open_browser: bool,
) -> Result<String> {
    let scope_str = copilot::SCOPES.join(" ");
    let init_params = [
        ("client_id", upstream.client_id.as_str()),
        ("scope", scope_str.as_str()),
    ];

    let req = http
        .post(&upstream.device_code_url)
        .header("Accept", "application/json")
        .header("user-agent", copilot::USER_AGENT)
        .form(&init_params);
    let resp = bounded(req, upstream).send().await?;

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| GatewayError::Auth(format!("failed to parse device code response: {e}")))?;

    let dc = copilot::parse_device_code_response(&json)?;

    eprintln!(
        "Please visit {} and enter code {} to authenticate.",
        dc.verification_uri, dc.user_code
    );
    tracing::warn!(
        verification_uri = %dc.verification_uri,
        user_code = %dc.user_code,
        "upstream authorization required"
    );
    if open_browser && let Err(e) = open::that(&dc.verification_uri) {
        tracing::debug!(error = %e, "failed to open browser automatically");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(dc.expires_in);
    let mut interval = dc.interval.max(upstream.poll_interval_secs);

    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;

        if tokio::time::Instant::now() >= deadline {
            return Err(GatewayError::Auth("device code expired".into()));
        }

        let token_params = [
            ("client_id", upstream.client_id.as_str()),
            ("device_code", dc.device_code.as_str()),
            ("grant_type", copilot::DEVICE_GRANT_TYPE),
        ];

        let req = http
            .post(&upstream.oauth_token_url)
            .header("Accept", "application/json")
            .header("user-agent", copilot::USER_AGENT)
            .form(&token_params);
        let resp = bounded(req, upstream).send().await?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("failed to parse token response: {e}")))?;

        match copilot::parse_poll_response(&json)? {
            PollOutcome::Pending => {}
            PollOutcome::SlowDown => interval += SLOW_DOWN_STEP_SECS,
            PollOutcome::Granted(grant) => {
                eprintln!("Authentication success!");
                return Ok(grant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock;
    use axum::{Json, Router, extract::State, routing::post};
    use serde_json::{Value, json};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn upstream_for(base: &str) -> UpstreamConfig {
        UpstreamConfig {
            device_code_url: format!("{base}/login/device/code"),
            oauth_token_url: format!("{base}/login/oauth/access_token"),
            poll_interval_secs: 0,
            ..UpstreamConfig::default()
        }
    }

    async fn device_code() -> Json<Value> {
        Json(json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://github.com/login/device",
            "expires_in": 60,
            "interval": 0
        }))
    }

    #[tokio::test]
    async fn test_device_login_polls_until_granted() {
        let polls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/login/device/code", post(device_code))
            .route(
                "/login/oauth/access_token",
                post(|State(polls): State<Arc<AtomicUsize>>| async move {
                    match polls.fetch_add(1, Ordering::SeqCst) {
                        0 => Json(json!({"error": "authorization_pending"})),
                        _ => Json(json!({"access_token": "ghu_granted", "token_type": "bearer"})),
                    }
                }),
            )
            .with_state(Arc::clone(&polls));
        let base = spawn_mock(app).await;

        let grant = device_login(&rquest::Client::new(), &upstream_for(&base), false)
            .await
            .unwrap();
        assert_eq!(grant, "ghu_granted");
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_device_login_terminal_error() {
        let app = Router::new()
            .route("/login/device/code", post(device_code))
            .route(
                "/login/oauth/access_token",
                post(|| async { Json(json!({"error": "access_denied"})) }),
            );
        let base = spawn_mock(app).await;

        let err = device_login(&rquest::Client::new(), &upstream_for(&base), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
