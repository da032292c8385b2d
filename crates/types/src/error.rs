//! Unified error type for the freegpt workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across freegpt crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Inbound request carried no valid bearer token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Inbound request failed shape or range validation.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// No Grant is stored; the interactive device flow has to run first.
    #[error("no upstream grant stored; run `freegpt login` to authorize")]
    GrantMissing,

    /// The interactive device flow is in progress.
    #[error("upstream authorization pending; complete the device login")]
    AuthorizationPending,

    /// The upstream refused to exchange the stored Grant.
    #[error("upstream rejected the stored grant (status {status}); re-authorization required")]
    GrantRejected { status: u16 },

    /// The upstream refused the short-lived Credential on a chat call.
    #[error("upstream rejected the session credential (status {status})")]
    CredentialRejected { status: u16 },

    /// The requested model is not in the registry (model lookup routes only).
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent storage (grant file, token file) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The upstream provider returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GatewayError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl GatewayError {
    /// Shorthand for a [`GatewayError::Validation`] naming `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the upstream rejected our credential (401/403).
    ///
    /// These failures are recovered by re-exchanging the Grant, not by retrying as is.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Self::Upstream { status, .. } | Self::CredentialRejected { status } => {
                matches!(status, 401 | 403)
            }
            _ => false,
        }
    }

    /// Returns `true` if the failure needs an operator to complete the device login.
    #[must_use]
    pub fn needs_authorization(&self) -> bool {
        matches!(
            self,
            Self::GrantMissing | Self::AuthorizationPending | Self::GrantRejected { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;
