//! Upstream authorization for the freegpt gateway.
//!
//! [`copilot`] holds the pure request/response handling of the device flow
//! and the credential exchange, [`flow`] drives the interactive device login,
//! and [`SessionManager`] keeps the Grant → Credential lifecycle.

pub mod copilot;
pub mod flow;
pub mod session;

pub use session::{SessionManager, SessionState};
