//! Shared fixtures for the integration tests: a scripted engine, stub HTTP
//! servers, and context builders.

#![allow(dead_code)]

use mobilepack::config::{FetchSettings, MonitoringSettings, PipelineSettings};
use mobilepack::engine::{
    BatchState, BatchStatus, EngineApi, EngineError, ProcessAssetsRequest, ProcessAssetsResponse,
    ProcessSceneRequest, ProcessSceneResponse,
};
use mobilepack::fetch::Fetcher;
use mobilepack::monitoring::MonitoringReporter;
use mobilepack::pipeline::PipelineContext;
use mobilepack::storage::LocalStorage;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome scripted for one output hash.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Submission accepted; batch completes with this ZIP on disk.
    CompletedZip(PathBuf),
    /// Submission accepted; batch completes without output.
    CompletedNoZip,
    /// Submission accepted; batch ends failed with this error.
    Failed(String),
    /// Submission rejected outright.
    Rejected { status: u16, body: String },
}

/// Engine stand-in with scripted per-hash outcomes.
#[derive(Default)]
pub struct ScriptedEngine {
    pub ready: bool,
    script: Mutex<HashMap<String, BatchOutcome>>,
    batches: Mutex<HashMap<String, BatchStatus>>,
    batch_counter: AtomicUsize,
    pub scene_submissions: Mutex<Vec<ProcessSceneRequest>>,
    pub asset_submissions: Mutex<Vec<ProcessAssetsRequest>>,
}

impl ScriptedEngine {
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Script the outcome for a given output hash.
    pub fn script(&self, output_hash: &str, outcome: BatchOutcome) {
        self.script
            .lock()
            .unwrap()
            .insert(output_hash.to_string(), outcome);
    }

    fn submit(&self, output_hash: &str) -> Result<String, EngineError> {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .get(output_hash)
            .cloned()
            .unwrap_or(BatchOutcome::CompletedNoZip);

        if let BatchOutcome::Rejected { status, body } = &outcome {
            return Err(EngineError::Submission {
                status: *status,
                body: body.clone(),
            });
        }

        let batch_id = format!("batch-{}", self.batch_counter.fetch_add(1, Ordering::SeqCst));
        let status = match outcome {
            BatchOutcome::CompletedZip(path) => BatchStatus {
                batch_id: batch_id.clone(),
                output_hash: Some(output_hash.to_string()),
                status: BatchState::Completed,
                progress: 1.0,
                zip_path: Some(path.to_string_lossy().into_owned()),
                error: None,
                jobs: vec![],
            },
            BatchOutcome::CompletedNoZip => BatchStatus {
                batch_id: batch_id.clone(),
                output_hash: Some(output_hash.to_string()),
                status: BatchState::Completed,
                progress: 1.0,
                zip_path: None,
                error: None,
                jobs: vec![],
            },
            BatchOutcome::Failed(message) => BatchStatus {
                batch_id: batch_id.clone(),
                output_hash: Some(output_hash.to_string()),
                status: BatchState::Failed,
                progress: 1.0,
                zip_path: None,
                error: Some(message),
                jobs: vec![],
            },
            BatchOutcome::Rejected { .. } => unreachable!(),
        };

        self.batches.lock().unwrap().insert(batch_id.clone(), status);
        Ok(batch_id)
    }
}

impl EngineApi for ScriptedEngine {
    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn process_scene(
        &self,
        request: &ProcessSceneRequest,
    ) -> Result<ProcessSceneResponse, EngineError> {
        self.scene_submissions.lock().unwrap().push(request.clone());
        let output = request
            .output_hash
            .clone()
            .unwrap_or_else(|| request.scene_hash.clone());
        let batch_id = self.submit(&output)?;
        Ok(ProcessSceneResponse {
            batch_id,
            output_hash: Some(output),
            scene_hash: Some(request.scene_hash.clone()),
            total_assets: None,
            pack_assets: None,
        })
    }

    async fn process_assets(
        &self,
        request: &ProcessAssetsRequest,
    ) -> Result<ProcessAssetsResponse, EngineError> {
        self.asset_submissions.lock().unwrap().push(request.clone());
        let output = request
            .output_hash
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let batch_id = self.submit(&output)?;
        Ok(ProcessAssetsResponse {
            batch_id,
            output_hash: Some(output),
            jobs: vec![],
            total: Some(request.assets.len() as u32),
        })
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, EngineError> {
        self.batches
            .lock()
            .unwrap()
            .get(batch_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidResponse {
                message: format!("unknown batch {batch_id}"),
            })
    }
}

/// Write a ZIP with the given `(name, body)` entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Serve an axum router on an ephemeral port; returns its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fast-failing fetch settings for tests.
pub fn fast_fetch_settings() -> FetchSettings {
    FetchSettings {
        max_retries: 0,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
        backoff_multiplier: 2.0,
    }
}

/// Pipeline settings pointed at the given content server.
pub fn pipeline_settings(content_server: &str, tmp_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        concurrent_bundles: 2,
        profile_concurrency: 4,
        content_server_url: content_server.to_string(),
        lambdas_url: format!("{content_server}/lambdas"),
        tmp_dir: tmp_dir.to_path_buf(),
    }
}

/// Build a pipeline context over a scripted engine and local storage.
pub fn scripted_context(
    engine: Arc<ScriptedEngine>,
    storage_dir: &Path,
    tmp_dir: &Path,
    content_server: &str,
) -> PipelineContext<ScriptedEngine, LocalStorage> {
    PipelineContext::new(
        Arc::new(Fetcher::new(fast_fetch_settings())),
        engine,
        Arc::new(LocalStorage::new(storage_dir)),
        MonitoringReporter::new(
            &MonitoringSettings {
                url: None,
                secret: None,
            },
            "godot_optimizer",
        ),
        pipeline_settings(content_server, tmp_dir),
        Duration::from_secs(30),
    )
}
