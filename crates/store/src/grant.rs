//! File-backed grant store: the Grant is kept as raw text in a single file.

use async_trait::async_trait;
use freegpt_types::{GrantStore, traits::Result};
use std::{io::ErrorKind, path::PathBuf};

/// A persistent [`GrantStore`] holding the Grant as the whole content of one file.
pub struct FileGrantStore {
    path: PathBuf,
}

impl FileGrantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl GrantStore for FileGrantStore {
    /// Reads the file; a missing file or whitespace-only content means no Grant.
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let grant = text.trim();
                Ok((!grant.is_empty()).then(|| grant.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, grant: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, grant).await?;
        tracing::debug!(path = %self.path.display(), "grant saved");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "grant removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
