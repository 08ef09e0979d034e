//! Top-level processing loop.
//!
//! The dispatcher owns the consume loop: one logical job at a time, routed
//! to the pipeline selected by `PROCESS_METHOD`. It is also the single
//! authority over the engine process - the restart that bounds engine
//! memory growth happens here, after a pipeline returns and before the
//! next poll, never mid-job.

mod admin;

pub use admin::{serve_admin, AdminState};

use crate::config::{Config, ProcessMethod};
use crate::engine::{EngineApi, EngineClient, EngineProcess};
use crate::entity::{EntityType, Job};
use crate::fetch::Fetcher;
use crate::monitoring::MonitoringReporter;
use crate::notify::{AnyPublisher, CompletionEvent, NoopPublisher, SnsPublisher};
use crate::pipeline::{process_scene_job, process_wearable_job, PipelineContext};
use crate::queue::{
    AnyQueue, HandlerFailure, JobHandler, MemoryQueue, MultiQueueConsumer, QueueMessage,
    SqsTransport, TaskQueue,
};
use crate::storage::{AnyStorage, LocalStorage, S3Storage, Storage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Pause after a queue-level error before polling again.
const LOOP_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Errors raised while wiring the worker together.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("queue configuration: {0}")]
    Queue(String),
}

/// The worker's processing loop and job router.
pub struct Dispatcher<E, S, Q>
where
    E: EngineApi,
    S: Storage,
    Q: TaskQueue,
{
    ctx: PipelineContext<E, S>,
    queue: Arc<Q>,
    method: ProcessMethod,
    /// Present only in optimizer mode; restarted after every job.
    engine_process: Option<Arc<EngineProcess>>,
    publisher: AnyPublisher,
}

/// The production dispatcher with statically-selected backends.
pub type WorkerDispatcher = Dispatcher<EngineClient, AnyStorage, AnyQueue>;

/// Wire the pipeline context (fetcher, engine, storage, reporter) from the
/// configuration.
///
/// Shared by the worker loop and the queue-free profile one-shot.
pub async fn build_pipeline_context(config: &Config) -> PipelineContext<EngineClient, AnyStorage> {
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone()));
    let engine = Arc::new(EngineClient::new(&config.engine.base_url));

    let storage = Arc::new(match &config.storage.bucket {
        Some(bucket) => {
            info!(bucket = %bucket, "using object-store storage");
            AnyStorage::S3(
                S3Storage::from_settings(&config.storage, config.queue.aws_region.clone()).await,
            )
        }
        None => {
            info!(dir = %config.storage.local_dir.display(), "using local storage");
            AnyStorage::Local(LocalStorage::new(&config.storage.local_dir))
        }
    });

    let reporter = MonitoringReporter::new(&config.monitoring, config.process_method.as_str());
    PipelineContext::new(
        fetcher,
        engine,
        storage,
        reporter,
        config.pipeline.clone(),
        config.engine.batch_timeout,
    )
}

impl WorkerDispatcher {
    /// Wire every component from the configuration.
    pub async fn build(config: &Config) -> Result<Self, DispatchError> {
        let ctx = build_pipeline_context(config).await;

        let queue = Arc::new(match &config.queue.task_queue {
            Some(task_queue) => {
                info!(queue = %task_queue, "using cloud multi-queue backend");
                AnyQueue::Cloud(MultiQueueConsumer::new(
                    SqsTransport::from_settings(&config.queue).await,
                    task_queue.clone(),
                    config.queue.priority_queue.clone(),
                    config.queue.wearable_queue.clone(),
                    config.queue.emote_queue.clone(),
                    config.queue.visibility_timeout,
                ))
            }
            None => {
                info!("no task queue configured, using in-memory backend");
                AnyQueue::Memory(MemoryQueue::new())
            }
        });

        let engine_process = (config.process_method == ProcessMethod::GodotOptimizer).then(|| {
            Arc::new(EngineProcess::new(
                config.engine.clone(),
                EngineClient::new(&config.engine.base_url),
            ))
        });

        let publisher = match &config.notify.topic_arn {
            Some(_) => AnyPublisher::Sns(
                SnsPublisher::from_settings(&config.notify, config.queue.aws_region.clone()).await,
            ),
            None => AnyPublisher::Noop(NoopPublisher),
        };

        Ok(Self {
            ctx,
            queue,
            method: config.process_method,
            engine_process,
            publisher,
        })
    }
}

impl<E, S, Q> Dispatcher<E, S, Q>
where
    E: EngineApi,
    S: Storage,
    Q: TaskQueue,
{
    /// Pipeline context, shared with the one-shot entry points.
    pub fn context(&self) -> &PipelineContext<E, S> {
        &self.ctx
    }

    /// Queue handle, shared with the CLI publish path.
    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// Producer handle for the admin enqueue route, in-memory mode only.
    pub fn memory_sender(&self) -> Option<tokio::sync::mpsc::UnboundedSender<Job>>
    where
        Q: MemorySenderSource,
    {
        self.queue.memory_sender()
    }

    /// Run the consume loop until the shutdown token fires.
    ///
    /// The token is only observed between polls: a signal during a job
    /// lets the pipeline finish, acknowledge, and restart the engine
    /// before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(method = self.method.as_str(), "worker loop started");
        self.ctx.reporter.set_idle();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.queue.consume_and_process(self) => {
                    if let Err(queue_error) = result {
                        error!(error = %queue_error, "queue poll failed");
                        tokio::time::sleep(LOOP_ERROR_PAUSE).await;
                    }
                }
            }
        }

        info!("worker loop stopped");
    }

    /// Route one job through the selected processing mode.
    async fn dispatch(&self, job: &Job) -> Option<crate::pipeline::ProcessReport> {
        match self.method {
            ProcessMethod::GodotOptimizer => Some(match job.entity_type {
                EntityType::Scene => process_scene_job(&self.ctx, job).await,
                EntityType::Wearable | EntityType::Emote => {
                    process_wearable_job(&self.ctx, job).await
                }
            }),
            // Every other method logs the job; the specialized pipelines
            // are not part of this worker build.
            _ => {
                info!(
                    method = self.method.as_str(),
                    entity_id = %job.entity_id,
                    entity_type = %job.entity_type,
                    content_server = job.content_server().unwrap_or("-"),
                    "consumed job"
                );
                None
            }
        }
    }
}

impl<E, S, Q> JobHandler for Dispatcher<E, S, Q>
where
    E: EngineApi,
    S: Storage,
    Q: TaskQueue,
{
    async fn handle(&self, job: Job, message: &QueueMessage) -> Result<(), HandlerFailure> {
        self.ctx
            .reporter
            .set_processing(&job.entity_id, message.is_priority);
        let started = Utc::now();

        let report = self.dispatch(&job).await;

        // The engine leaks across batches; restart it while no job is
        // running. Failures here surface on the next job's ready check.
        if let Some(process) = &self.engine_process {
            if let Err(restart_error) = process.restart().await {
                error!(error = %restart_error, "engine restart failed");
            }
        }

        let (success, first_error) = match &report {
            Some(report) => (report.result.success, report.errors.first().cloned()),
            None => (true, None),
        };

        if let Some(report) = &report {
            self.publisher
                .publish_best_effort(&CompletionEvent::new(
                    &report.entity_id,
                    report.entity_type,
                    success,
                ))
                .await;
        }

        self.ctx
            .reporter
            .job_complete(
                &job.entity_id,
                success,
                started,
                first_error.as_deref(),
                message.is_priority,
            )
            .await;
        self.ctx.reporter.set_idle();

        if success {
            Ok(())
        } else {
            Err(HandlerFailure(
                first_error.unwrap_or_else(|| "pipeline failed".to_string()),
            ))
        }
    }
}

/// Access to the in-memory queue's producer side, when there is one.
pub trait MemorySenderSource {
    fn memory_sender(&self) -> Option<tokio::sync::mpsc::UnboundedSender<Job>>;
}

impl MemorySenderSource for AnyQueue {
    fn memory_sender(&self) -> Option<tokio::sync::mpsc::UnboundedSender<Job>> {
        match self {
            AnyQueue::Memory(queue) => Some(queue.sender()),
            AnyQueue::Cloud(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FetchSettings, MonitoringSettings, PipelineSettings,
    };
    use crate::engine::{
        BatchStatus, EngineError, ProcessAssetsRequest, ProcessAssetsResponse,
        ProcessSceneRequest, ProcessSceneResponse,
    };
    use crate::queue::MemoryQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that must never be called in logging mode.
    struct PanickingEngine;

    impl EngineApi for PanickingEngine {
        async fn is_ready(&self) -> bool {
            panic!("engine used in logging mode")
        }
        async fn process_scene(
            &self,
            _: &ProcessSceneRequest,
        ) -> Result<ProcessSceneResponse, EngineError> {
            panic!("engine used in logging mode")
        }
        async fn process_assets(
            &self,
            _: &ProcessAssetsRequest,
        ) -> Result<ProcessAssetsResponse, EngineError> {
            panic!("engine used in logging mode")
        }
        async fn batch_status(&self, _: &str) -> Result<BatchStatus, EngineError> {
            panic!("engine used in logging mode")
        }
    }

    /// Storage that counts stores and always succeeds.
    #[derive(Default)]
    struct CountingStorage {
        stores: AtomicUsize,
    }

    impl Storage for CountingStorage {
        async fn store(
            &self,
            _key: &str,
            _src: &std::path::Path,
        ) -> Result<(), crate::storage::StorageError> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn test_context(
        engine: Arc<PanickingEngine>,
        storage: Arc<CountingStorage>,
    ) -> PipelineContext<PanickingEngine, CountingStorage> {
        PipelineContext::new(
            Arc::new(Fetcher::new(FetchSettings {
                max_retries: 0,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                timeout: Duration::from_secs(1),
                backoff_multiplier: 2.0,
            })),
            engine,
            storage,
            MonitoringReporter::new(
                &MonitoringSettings {
                    url: None,
                    secret: None,
                },
                "log",
            ),
            PipelineSettings {
                concurrent_bundles: 4,
                profile_concurrency: 16,
                content_server_url: "https://content".to_string(),
                lambdas_url: "https://lambdas".to_string(),
                tmp_dir: std::env::temp_dir(),
            },
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn test_log_mode_touches_nothing() {
        let storage = Arc::new(CountingStorage::default());
        let dispatcher = Dispatcher {
            ctx: test_context(Arc::new(PanickingEngine), Arc::clone(&storage)),
            queue: Arc::new(MemoryQueue::new()),
            method: ProcessMethod::Log,
            engine_process: None,
            publisher: AnyPublisher::Noop(NoopPublisher),
        };

        let job = Job::new("bafy", EntityType::Scene, "https://content");
        let message = QueueMessage {
            id: "m1".to_string(),
            is_priority: false,
            receipt: "r1".to_string(),
            source_queue: "memory".to_string(),
        };

        dispatcher.handle(job, &message).await.unwrap();
        assert_eq!(storage.stores.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_log_mode_via_queue_loop() {
        let queue = Arc::new(MemoryQueue::new());
        let storage = Arc::new(CountingStorage::default());
        let dispatcher = Dispatcher {
            ctx: test_context(Arc::new(PanickingEngine), storage),
            queue: Arc::clone(&queue),
            method: ProcessMethod::GodotMinimap,
            engine_process: None,
            publisher: AnyPublisher::Noop(NoopPublisher),
        };

        queue
            .publish(&Job::new("bafy", EntityType::Wearable, "https://c"), false)
            .await
            .unwrap();
        queue.consume_and_process(&dispatcher).await.unwrap();
        assert_eq!(queue.handler_failures(), 0);
    }
}
