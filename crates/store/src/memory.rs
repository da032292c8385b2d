//! In-memory grant store backed by a `Mutex<Option<String>>`.

use async_trait::async_trait;
use freegpt_types::{GrantStore, traits::Result};
use std::sync::Mutex;

/// An in-memory [`GrantStore`] implementation for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryGrantStore {
    grant: Mutex<Option<String>>,
}

impl InMemoryGrantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `grant`.
    pub fn with_grant(grant: impl Into<String>) -> Self {
        Self {
            grant: Mutex::new(Some(grant.into())),
        }
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self
            .grant
            .lock()
            .unwrap()
            .clone()
            .filter(|g| !g.trim().is_empty()))
    }

    async fn save(&self, grant: &str) -> Result<()> {
        *self.grant.lock().unwrap() = Some(grant.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.grant.lock().unwrap().take();
        Ok(())
    }
}
