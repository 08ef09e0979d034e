//! Artifact storage behind a two-backend contract.
//!
//! Pipelines upload content-addressed artifacts (`{hash}-mobile.zip`) and
//! per-job reports (`{entityId}-report.json`) through the [`Storage`] trait.
//! The object-store and local-filesystem backends are interchangeable; the
//! choice is made once at process start from configuration.

mod local;
mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Per-file retry budget inside [`Storage::store_batch`].
const BATCH_RETRY_BUDGET: u32 = 3;

/// Pause between attempts for one batch file.
const BATCH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    /// At least one batch file permanently failed after the retry budget.
    #[error("{failed} of {total} batch files failed permanently")]
    BatchFailed { failed: usize, total: usize },
}

/// One file of a batch upload.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub key: String,
    pub path: PathBuf,
}

impl BatchFile {
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }
}

/// Artifact storage contract.
///
/// `store` is a single upload: backends log success and failure and return
/// the error for callers that track it, but a failed single store never
/// aborts a pipeline. `store_batch` is the loud variant: every file gets a
/// retry budget and any permanent failure fails the whole call.
pub trait Storage: Send + Sync + 'static {
    /// Upload or copy one file under the given key.
    fn store(&self, key: &str, src: &Path) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Upload a set of files, retrying each up to the budget.
    ///
    /// Fails with [`StorageError::BatchFailed`] if any file still fails
    /// after its retries; success means every file was stored.
    fn store_batch(
        &self,
        files: &[BatchFile],
    ) -> impl Future<Output = Result<(), StorageError>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut failed = 0usize;
            for file in files {
                let mut stored = false;
                for attempt in 1..=BATCH_RETRY_BUDGET {
                    match self.store(&file.key, &file.path).await {
                        Ok(()) => {
                            stored = true;
                            break;
                        }
                        Err(error) => {
                            warn!(
                                key = %file.key,
                                attempt,
                                error = %error,
                                "batch file store failed"
                            );
                            if attempt < BATCH_RETRY_BUDGET {
                                tokio::time::sleep(BATCH_RETRY_DELAY).await;
                            }
                        }
                    }
                }
                if !stored {
                    failed += 1;
                }
            }

            if failed > 0 {
                Err(StorageError::BatchFailed {
                    failed,
                    total: files.len(),
                })
            } else {
                Ok(())
            }
        }
    }
}

/// Statically-selected storage backend.
///
/// Selection happens once at startup (`BUCKET` set selects the object
/// store); an enum keeps the pipelines monomorphic without trait objects.
#[derive(Debug, Clone)]
pub enum AnyStorage {
    S3(S3Storage),
    Local(LocalStorage),
}

impl Storage for AnyStorage {
    async fn store(&self, key: &str, src: &Path) -> Result<(), StorageError> {
        match self {
            Self::S3(backend) => backend.store(key, src).await,
            Self::Local(backend) => backend.store(key, src).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::S3(backend) => backend.name(),
            Self::Local(backend) => backend.name(),
        }
    }
}
