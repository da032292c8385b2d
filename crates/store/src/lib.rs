//! Storage backends for the freegpt gateway.
//!
//! Provides the upstream Grant stores (file-backed for production, in-memory
//! for tests) and the JSON-file store of locally issued API tokens.

pub mod grant;
pub mod memory;
pub mod tokens;

pub use grant::FileGrantStore;
pub use memory::InMemoryGrantStore;
pub use tokens::{ApiTokenStore, TokenInfo, TokenRecord};
