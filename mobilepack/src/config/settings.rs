//! Settings structs for all configuration sections.
//!
//! Each struct covers one concern of the worker. These are pure data types;
//! the environment parsing lives in small `from_env` constructors so the
//! rest of the crate never touches `std::env`.

use super::{env_millis, env_opt, env_u64, env_usize, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

/// Queue backend selection and URLs.
///
/// Absence of `TASK_QUEUE` switches the worker to the in-memory backend,
/// which is fed only through the admin surface.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Default (scene) queue URL. `None` selects the in-memory backend.
    pub task_queue: Option<String>,
    /// Priority queue URL, polled before every entity-typed queue.
    pub priority_queue: Option<String>,
    /// Wearable deployments queue URL.
    pub wearable_queue: Option<String>,
    /// Emote deployments queue URL.
    pub emote_queue: Option<String>,
    /// Cloud endpoint override (local emulators).
    pub aws_endpoint: Option<String>,
    /// Cloud region.
    pub aws_region: Option<String>,
    /// How long a received delivery stays invisible to other replicas.
    pub visibility_timeout: Duration,
}

impl QueueSettings {
    pub(super) fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            task_queue: env_opt("TASK_QUEUE"),
            priority_queue: env_opt("PRIORITY_TASK_QUEUE"),
            wearable_queue: env_opt("WEARABLE_TASK_QUEUE"),
            emote_queue: env_opt("EMOTE_TASK_QUEUE"),
            aws_endpoint: env_opt("AWS_ENDPOINT"),
            aws_region: env_opt("AWS_REGION"),
            visibility_timeout: Duration::from_secs(10_800),
        })
    }

    /// True when the cloud multi-queue backend is selected.
    pub fn uses_cloud_backend(&self) -> bool {
        self.task_queue.is_some()
    }
}

/// Object-store configuration.
///
/// Absence of `BUCKET` switches to local storage under `./storage`.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Object-store bucket. `None` selects the local backend.
    pub bucket: Option<String>,
    /// Object-store endpoint override.
    pub endpoint: Option<String>,
    /// Key prefix; effective key is `{prefix}/{key}`.
    pub prefix: Option<String>,
    /// Static credentials, when not using the ambient provider chain.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base directory for the local backend.
    pub local_dir: PathBuf,
}

impl StorageSettings {
    pub(super) fn from_env() -> Self {
        Self {
            bucket: env_opt("BUCKET"),
            endpoint: env_opt("S3_ENDPOINT"),
            prefix: env_opt("S3_PREFIX"),
            access_key_id: env_opt("S3_ACCESS_KEY_ID"),
            secret_access_key: env_opt("S3_SECRET_ACCESS_KEY"),
            local_dir: PathBuf::from("./storage"),
        }
    }
}

/// Optimization engine endpoint and process lifecycle tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base URL of the engine's local HTTP API.
    pub base_url: String,
    /// Port passed to a respawned engine (`--asset-server-port`).
    pub port: u16,
    /// Wall-clock deadline for one optimization batch.
    pub batch_timeout: Duration,
    /// Executable spawned on restart.
    pub binary: PathBuf,
    /// Process name used as a kill fallback when the child handle is gone.
    pub process_name: String,
}

impl EngineSettings {
    pub(super) fn from_env() -> Result<Self, ConfigError> {
        let port = env_u64("ASSET_SERVER_PORT", 8080)? as u16;
        Ok(Self {
            base_url: env_opt("ASSET_SERVER_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            port,
            batch_timeout: env_millis("ASSET_SERVER_TIMEOUT_MS", 600_000)?,
            binary: PathBuf::from(
                env_opt("ASSET_SERVER_BIN").unwrap_or_else(|| "godot".to_string()),
            ),
            process_name: env_opt("ASSET_SERVER_PROCESS_NAME")
                .unwrap_or_else(|| "godot".to_string()),
        })
    }
}

/// Retrying fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Backoff base delay for attempt 0.
    pub initial_delay: Duration,
    /// Backoff delay ceiling.
    pub max_delay: Duration,
    /// Per-attempt hard deadline.
    pub timeout: Duration,
    /// Backoff growth factor.
    pub backoff_multiplier: f64,
}

impl FetchSettings {
    pub(super) fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_retries: env_u64("FETCH_MAX_RETRIES", 3)? as u32,
            initial_delay: env_millis("FETCH_INITIAL_DELAY_MS", 1_000)?,
            max_delay: env_millis("FETCH_MAX_DELAY_MS", 30_000)?,
            timeout: env_millis("FETCH_TIMEOUT_MS", 60_000)?,
            backoff_multiplier: env_u64("FETCH_BACKOFF_MULTIPLIER", 2)? as f64,
        })
    }
}

/// Pipeline fan-out bounds and external content endpoints.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Concurrent per-asset engine batches inside the scene pipeline.
    pub concurrent_bundles: usize,
    /// Concurrent GLTF jobs inside the profile expansion.
    pub profile_concurrency: usize,
    /// Content server used by CLI one-shots and profile expansion.
    pub content_server_url: String,
    /// Lambdas endpoint resolving avatar profiles.
    pub lambdas_url: String,
    /// Scratch directory for reports before upload.
    pub tmp_dir: PathBuf,
}

impl PipelineSettings {
    pub(super) fn from_env() -> Result<Self, ConfigError> {
        let concurrent_bundles = env_usize("ASSET_SERVER_CONCURRENT_BUNDLES", 4)?;
        Ok(Self {
            concurrent_bundles,
            // Profile expansion fans out wider than scene packing; a
            // configured override applies to both.
            profile_concurrency: match env_opt("ASSET_SERVER_CONCURRENT_BUNDLES") {
                Some(_) => concurrent_bundles,
                None => 16,
            },
            content_server_url: env_opt("CONTENT_SERVER_URL")
                .unwrap_or_else(|| "https://peer.decentraland.org/content".to_string()),
            lambdas_url: env_opt("LAMBDAS_URL")
                .unwrap_or_else(|| "https://peer.decentraland.org/lambdas".to_string()),
            tmp_dir: std::env::temp_dir(),
        })
    }
}

/// Monitoring reporter endpoint. Both values must be present for the
/// reporter to be active; otherwise every report is a no-op.
#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    pub url: Option<String>,
    pub secret: Option<String>,
}

impl MonitoringSettings {
    pub(super) fn from_env() -> Self {
        Self {
            url: env_opt("MONITORING_URL"),
            secret: env_opt("MONITORING_SECRET"),
        }
    }

    /// True when heartbeats and job reports will actually be sent.
    pub fn is_active(&self) -> bool {
        self.url.is_some() && self.secret.is_some()
    }
}

/// Completion notification topic. Absent `SNS_ARN` selects the no-op
/// publisher.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub topic_arn: Option<String>,
    pub endpoint: Option<String>,
}

impl NotifySettings {
    pub(super) fn from_env() -> Self {
        Self {
            topic_arn: env_opt("SNS_ARN"),
            endpoint: env_opt("SNS_ENDPOINT"),
        }
    }
}

/// Admin HTTP surface (ping, enqueue, file serve, metrics).
#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub port: u16,
}

impl AdminSettings {
    pub(super) fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: env_u64("ADMIN_PORT", 5001)? as u16,
        })
    }
}
