//! Worker configuration.
//!
//! All configuration is read from the environment exactly once at startup
//! and carried in a [`Config`] value that is passed explicitly to every
//! component. Nothing in this crate reads environment variables after
//! [`Config::from_env`] returns.

mod settings;

pub use settings::{
    AdminSettings, EngineSettings, FetchSettings, MonitoringSettings, NotifySettings,
    PipelineSettings, QueueSettings, StorageSettings,
};

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building a [`Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was present but not parseable.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// PROCESS_METHOD named a mode this worker does not know.
    #[error("unknown PROCESS_METHOD {0:?}")]
    UnknownProcessMethod(String),
}

/// Processing mode selected by `PROCESS_METHOD`.
///
/// Parsing is case-insensitive. An unknown value is a startup-fatal error;
/// the fleet relies on a misconfigured replica refusing to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMethod {
    /// Log each consumed job and do nothing else.
    Log,
    /// Minimap generation (accepted for fleet config compatibility,
    /// routed to the logging handler in this worker build).
    GodotMinimap,
    /// Full scene / wearable / emote optimization through the engine.
    GodotOptimizer,
    /// CRDT generation (accepted, routed to the logging handler).
    GenerateCrdt,
    /// Imposter generation (accepted, routed to the logging handler).
    GenerateImposters,
}

impl ProcessMethod {
    /// Parse a `PROCESS_METHOD` value.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "godot_minimap" => Ok(Self::GodotMinimap),
            "godot_optimizer" => Ok(Self::GodotOptimizer),
            "generate_crdt" => Ok(Self::GenerateCrdt),
            "generate_imposters" => Ok(Self::GenerateImposters),
            _ => Err(ConfigError::UnknownProcessMethod(value.to_string())),
        }
    }

    /// Name used in heartbeats and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::GodotMinimap => "godot_minimap",
            Self::GodotOptimizer => "godot_optimizer",
            Self::GenerateCrdt => "generate_crdt",
            Self::GenerateImposters => "generate_imposters",
        }
    }
}

/// Complete worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected processing mode.
    pub process_method: ProcessMethod,
    /// Queue URLs and backend selection.
    pub queue: QueueSettings,
    /// Object-store / local storage selection.
    pub storage: StorageSettings,
    /// Optimization engine endpoint and lifecycle tuning.
    pub engine: EngineSettings,
    /// Retrying fetcher tuning.
    pub fetch: FetchSettings,
    /// Scene / profile fan-out bounds and content endpoints.
    pub pipeline: PipelineSettings,
    /// Monitoring reporter endpoint, if any.
    pub monitoring: MonitoringSettings,
    /// Completion notification topic, if any.
    pub notify: NotifySettings,
    /// Admin HTTP surface.
    pub admin: AdminSettings,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let process_method = match env_opt("PROCESS_METHOD") {
            Some(v) => ProcessMethod::parse(&v)?,
            None => ProcessMethod::Log,
        };

        Ok(Self {
            process_method,
            queue: QueueSettings::from_env()?,
            storage: StorageSettings::from_env(),
            engine: EngineSettings::from_env()?,
            fetch: FetchSettings::from_env()?,
            pipeline: PipelineSettings::from_env()?,
            monitoring: MonitoringSettings::from_env(),
            notify: NotifySettings::from_env(),
            admin: AdminSettings::from_env()?,
        })
    }
}

pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env_opt(key) {
        Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key,
            value: v,
            reason: format!("{e}"),
        }),
        None => Ok(default),
    }
}

pub(crate) fn env_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env_opt(key) {
        Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key,
            value: v,
            reason: format!("{e}"),
        }),
        None => Ok(default),
    }
}

pub(crate) fn env_millis(key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(env_u64(key, default_ms)?))
}
