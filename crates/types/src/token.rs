//! Upstream session credential and expiry logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds before the reported expiry at which a credential is treated as stale.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Short-lived bearer value exchanged from the Grant, used on chat calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    /// Chat API base URL this credential is valid for (no trailing slash).
    pub api_base: String,
    /// Unix seconds; `None` when the upstream did not say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            expires_at: None,
        }
    }

    /// Set the expiry to an absolute unix timestamp.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Full URL of the chat completions endpoint.
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Return `true` if the credential expires within 60 seconds.
    ///
    /// A credential without a known expiry stays valid until the upstream
    /// rejects it.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        now_unix() + EXPIRY_MARGIN_SECS >= expires_at
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
