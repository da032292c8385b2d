//! Core types and traits for the freegpt workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gateway: the chat data model, the upstream credential, the unified error
//! type, and the async traits that the storage and provider layers implement.

pub mod chat;
pub mod error;
pub mod token;
pub mod traits;

pub use chat::{ChatRequest, Completion, Fragment, Message, Role, SamplingParams, Usage};
pub use error::GatewayError;
pub use token::Credential;
pub use traits::{ByteStream, ChatBackend, FragmentStream, GrantStore};
