//! Pipeline context containing shared resources.
//!
//! The context provides access to the resources every pipeline stage
//! needs. It is cheaply cloneable (via Arc) for passing into spawned
//! per-asset tasks; the seams are generic so tests can substitute a
//! scripted engine or an in-memory storage backend.

use crate::config::PipelineSettings;
use crate::engine::EngineApi;
use crate::fetch::Fetcher;
use crate::monitoring::MonitoringReporter;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// Shared resources for pipeline invocations.
pub struct PipelineContext<E, S>
where
    E: EngineApi,
    S: Storage,
{
    /// Retrying client for content server calls.
    pub fetcher: Arc<Fetcher>,

    /// Optimization engine API.
    pub engine: Arc<E>,

    /// Artifact storage backend.
    pub storage: Arc<S>,

    /// Best-effort monitoring reporter.
    pub reporter: MonitoringReporter,

    /// Fan-out bounds and content endpoints.
    pub settings: PipelineSettings,

    /// Wall-clock deadline for one engine batch.
    pub batch_timeout: Duration,
}

impl<E, S> Clone for PipelineContext<E, S>
where
    E: EngineApi,
    S: Storage,
{
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            engine: Arc::clone(&self.engine),
            storage: Arc::clone(&self.storage),
            reporter: self.reporter.clone(),
            settings: self.settings.clone(),
            batch_timeout: self.batch_timeout,
        }
    }
}

impl<E, S> PipelineContext<E, S>
where
    E: EngineApi,
    S: Storage,
{
    /// Creates a new pipeline context.
    pub fn new(
        fetcher: Arc<Fetcher>,
        engine: Arc<E>,
        storage: Arc<S>,
        reporter: MonitoringReporter,
        settings: PipelineSettings,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            engine,
            storage,
            reporter,
            settings,
            batch_timeout,
        }
    }

    /// Content base URL (`{server}/contents/`) for a content server.
    pub fn contents_base(content_server_url: &str) -> String {
        format!("{}/contents/", content_server_url.trim_end_matches('/'))
    }
}
