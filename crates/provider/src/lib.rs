//! Upstream chat execution for the freegpt gateway.
//!
//! [`CopilotExecutor`] implements [`freegpt_types::ChatBackend`] against the
//! Copilot chat API, [`ModelMap`] resolves client model names, and
//! [`Conversation`] keeps the shared history of the interactive client.

pub mod conversation;
pub mod copilot;
pub mod registry;

pub use conversation::Conversation;
pub use copilot::CopilotExecutor;
pub use registry::ModelMap;
