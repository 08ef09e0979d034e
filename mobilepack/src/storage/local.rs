//! Local filesystem storage backend.

use super::{Storage, StorageError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stores artifacts under a base directory, creating parents as needed.
///
/// Selected when no bucket is configured; also what the admin surface's
/// `/storage/{*path}` route serves from.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a backend rooted at `base_dir`. The directory is created
    /// lazily on the first store.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory artifacts are written under.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn target_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

impl Storage for LocalStorage {
    async fn store(&self, key: &str, src: &Path) -> Result<(), StorageError> {
        let target = self.target_path(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = tokio::fs::copy(src, &target).await?;
        info!(key, bytes, backend = "local", "stored artifact");
        debug!(target = %target.display(), "local store target");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
