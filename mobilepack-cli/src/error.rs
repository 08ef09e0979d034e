//! CLI error surface.

use mobilepack::config::ConfigError;
use mobilepack::dispatcher::DispatchError;
use mobilepack::entity::PointerError;
use mobilepack::logging::LogError;
use mobilepack::profile::ProfileError;
use mobilepack::queue::QueueError;
use thiserror::Error;

/// Errors surfaced to the operator with a non-zero exit status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to initialize logging: {0}")]
    Logging(#[from] LogError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to wire worker: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("could not resolve entity id: {0}")]
    Resolve(#[from] PointerError),

    #[error("failed to enqueue job: {0}")]
    Enqueue(#[from] QueueError),

    #[error("profile expansion failed: {0}")]
    Profile(#[from] ProfileError),
}
