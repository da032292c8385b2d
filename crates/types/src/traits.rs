//! Async traits shared across all freegpt crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `freegpt-types`, not on each other.

use crate::{ChatRequest, Completion, Fragment};
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

pub use crate::error::Result;

/// A pinned, sendable stream of raw upstream body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A pinned, sendable, consume-once stream of streaming chat fragments.
///
/// Always ends with [`Fragment::Done`]. Dropping it closes the upstream
/// connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Durable storage for the long-lived upstream Grant.
///
/// Exactly one Grant exists per deployment.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Load the Grant; absent or empty storage yields `None`.
    async fn load(&self) -> Result<Option<String>>;
    /// Persist (overwrite) the Grant.
    async fn save(&self, grant: &str) -> Result<()>;
    /// Delete the Grant. Deleting a missing Grant is not an error.
    async fn remove(&self) -> Result<()>;
}

/// Executes chat requests against the upstream provider.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run a non-streaming chat call.
    ///
    /// Per-call upstream failures come back as an error-shaped
    /// [`Completion`]; `Err` is reserved for session failures the operator
    /// has to resolve (missing or rejected Grant).
    async fn complete(&self, request: &ChatRequest) -> Result<Completion>;

    /// Run a streaming chat call.
    ///
    /// Same error split as [`ChatBackend::complete`]: upstream failures are
    /// delivered in-band as [`Fragment::Error`].
    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream>;

    /// Client-facing model names this backend accepts.
    fn supported_models(&self) -> Vec<String>;
}
