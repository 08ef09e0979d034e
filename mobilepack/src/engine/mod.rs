//! Optimization engine integration.
//!
//! The engine is an external subprocess that renders and packs assets,
//! controlled through a local HTTP API. This module wraps that API
//! ([`EngineClient`]) and the process lifecycle ([`EngineProcess`]).
//!
//! The client performs no business logic; all sequencing lives in the
//! pipelines. The process is a per-worker singleton: only the dispatcher
//! restarts it, and only between jobs.

mod client;
mod process;
mod types;

pub use client::EngineClient;
pub use process::EngineProcess;
pub use types::{
    AssetKind, AssetRequest, BatchState, BatchStatus, EngineJobStatus, ProcessAssetsRequest,
    ProcessAssetsResponse, ProcessSceneRequest, ProcessSceneResponse, SceneMetadata,
};

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Interval between completion polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Errors raised by the engine client and lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure talking to the engine API.
    #[error("engine unreachable: {message}")]
    Unreachable { message: String },

    /// The engine rejected a batch submission.
    #[error("engine rejected submission with {status}: {body}")]
    Submission { status: u16, body: String },

    /// The engine returned a body the client could not decode.
    #[error("invalid engine response: {message}")]
    InvalidResponse { message: String },

    /// A batch did not reach a terminal status within the deadline.
    #[error("batch {batch_id} did not finish within {waited:?}")]
    Timeout { batch_id: String, waited: Duration },

    /// The engine process did not come back up after a restart.
    #[error("engine not ready after restart: {message}")]
    NotReady { message: String },

    /// Spawning the engine process failed.
    #[error("failed to spawn engine: {0}")]
    Spawn(#[from] std::io::Error),
}

impl EngineError {
    /// True for submission rejections that mean "nothing to optimize".
    ///
    /// The engine answers a metadata pass over an asset-free scene with a
    /// 400 carrying a "No processable assets" explanation; pipelines treat
    /// that as success with zero assets.
    pub fn is_empty_scene(&self) -> bool {
        match self {
            Self::Submission { status, body } => {
                *status == 400 || body.contains("No processable assets")
            }
            _ => false,
        }
    }
}

/// Engine HTTP API contract.
///
/// The concrete implementation is [`EngineClient`]; pipelines stay generic
/// over this trait so tests can script batch outcomes.
pub trait EngineApi: Send + Sync + 'static {
    /// True iff the engine's health endpoint answers 2xx. All errors are
    /// folded into `false`.
    fn is_ready(&self) -> impl Future<Output = bool> + Send;

    /// Submit a scene batch. Empty `pack_hashes` selects metadata-only mode.
    fn process_scene(
        &self,
        request: &ProcessSceneRequest,
    ) -> impl Future<Output = Result<ProcessSceneResponse, EngineError>> + Send;

    /// Submit an asset batch.
    fn process_assets(
        &self,
        request: &ProcessAssetsRequest,
    ) -> impl Future<Output = Result<ProcessAssetsResponse, EngineError>> + Send;

    /// Fetch the current status of a batch.
    fn batch_status(
        &self,
        batch_id: &str,
    ) -> impl Future<Output = Result<BatchStatus, EngineError>> + Send;

    /// Poll [`EngineApi::batch_status`] until the batch reaches a terminal
    /// status, raising [`EngineError::Timeout`] past the deadline.
    ///
    /// The returned status is terminal (`completed` or `failed`); deciding
    /// what a failed batch means is the caller's job.
    fn wait_for_completion(
        &self,
        batch_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<BatchStatus, EngineError>> + Send
    where
        Self: Sized,
    {
        async move {
            let started = std::time::Instant::now();
            loop {
                let status = self.batch_status(batch_id).await?;
                if status.status.is_terminal() {
                    return Ok(status);
                }

                if started.elapsed() > timeout {
                    return Err(EngineError::Timeout {
                        batch_id: batch_id.to_string(),
                        waited: started.elapsed(),
                    });
                }

                debug!(
                    batch_id,
                    status = ?status.status,
                    progress = status.progress,
                    "batch in progress"
                );
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
