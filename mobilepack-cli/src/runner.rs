//! Common setup and run modes.

use crate::error::CliError;
use mobilepack::config::Config;
use mobilepack::dispatcher::{
    build_pipeline_context, serve_admin, AdminState, WorkerDispatcher,
};
use mobilepack::entity::{resolve_entity_id, EntityType, Job};
use mobilepack::logging::{self, LogGuard};
use mobilepack::metrics;
use mobilepack::profile::expand_profile;
use mobilepack::queue::TaskQueue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the pieces every mode needs: logging, metrics, configuration.
pub struct CliRunner {
    config: Config,
    _logging: LogGuard,
}

impl CliRunner {
    /// Initialize logging and load configuration from the environment.
    pub fn init() -> Result<Self, CliError> {
        let logging = logging::init(logging::default_sink())?;

        let config = Config::from_env()?;
        info!(
            version = mobilepack::VERSION,
            method = config.process_method.as_str(),
            "mobilepack starting"
        );

        Ok(Self {
            config,
            _logging: logging,
        })
    }

    /// One-shot profile expansion; exits 0 on completion.
    pub async fn run_profile(&self, address: &str) -> Result<(), CliError> {
        let ctx = build_pipeline_context(&self.config).await;
        let summary = expand_profile(&ctx, address).await?;

        info!(
            address,
            entities = summary.entities,
            gltfs = summary.gltfs,
            successful = summary.successful,
            failed = summary.failed,
            "profile expansion complete"
        );
        Ok(())
    }

    /// The normal worker: queue loop, admin surface, heartbeats.
    ///
    /// When `entity_id` is given, it is resolved and enqueued before the
    /// loop starts, so this replica (or any other) picks it up.
    pub async fn run_worker(&self, entity_id: Option<&str>) -> Result<(), CliError> {
        let metrics_handle = metrics::try_init_metrics();
        let dispatcher = WorkerDispatcher::build(&self.config).await?;
        let shutdown = CancellationToken::new();

        let admin_state = AdminState {
            enqueue: dispatcher.memory_sender(),
            storage_dir: self.config.storage.local_dir.clone(),
            metrics: metrics_handle,
        };
        let admin_shutdown = shutdown.clone();
        let admin_port = self.config.admin.port;
        tokio::spawn(async move {
            if let Err(error) = serve_admin(admin_state, admin_port, admin_shutdown).await {
                warn!(error = %error, "admin surface stopped");
            }
        });

        dispatcher
            .context()
            .reporter
            .start_heartbeat(shutdown.clone());

        if let Some(raw_id) = entity_id {
            let ctx = dispatcher.context();
            let resolved = resolve_entity_id(
                &ctx.fetcher,
                &self.config.pipeline.content_server_url,
                raw_id,
            )
            .await?;

            let job = Job::new(
                resolved.clone(),
                EntityType::Scene,
                &self.config.pipeline.content_server_url,
            );
            let message_id = dispatcher.queue().publish(&job, false).await?;
            info!(entity_id = %resolved, message_id = %message_id, "enqueued entity");
        }

        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                signal_shutdown.cancel();
            }
        });

        dispatcher.run(shutdown).await;
        Ok(())
    }
}
