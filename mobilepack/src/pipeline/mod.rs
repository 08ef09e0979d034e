//! Optimization pipelines.
//!
//! Two pipelines share one context: the scene pipeline (a metadata-only
//! engine pass followed by a bounded per-asset fan-out) and the
//! wearable/emote pipeline (one asset batch per job).
//!
//! # Failure semantics
//!
//! A pipeline invocation always produces a [`ProcessReport`] and always
//! writes it to storage before returning, success or error. Individual
//! asset failures are recorded and do not abort the job; submission
//! failures and batch timeouts end the job with `success: false`. Either
//! way the queue delivery is acknowledged by the caller.

mod context;
mod report;
mod scene;
mod validation;
mod wearable;

pub use context::PipelineContext;
pub use report::{IndividualAssets, ProcessReport, ReportResult};
pub use scene::process_scene_job;
pub use validation::{validate_entity, ValidationError, MAX_CONTENT_SIZE_BYTES, MAX_GLTF_COUNT};
pub use wearable::process_wearable_job;

use crate::engine::EngineError;
use crate::fetch::FetchError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that end a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The job carried no content server URL.
    #[error("job has no content server url")]
    MissingContentServer,

    /// The engine health probe failed before any work started.
    #[error("engine is not ready")]
    EngineNotReady,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    /// A batch reached terminal `failed` status.
    #[error("batch {batch_id} failed: {message}")]
    BatchFailed { batch_id: String, message: String },

    /// A batch completed but produced no ZIP.
    #[error("batch {batch_id} completed without output")]
    MissingZip { batch_id: String },

    /// The metadata ZIP could not be read.
    #[error("metadata archive unreadable: {0}")]
    Archive(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}
