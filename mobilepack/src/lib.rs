//! MobilePack - deployment-processing worker for mobile-ready assets
//!
//! This library implements a worker that pulls deployment jobs from a fanout
//! of priority/entity-typed queues, drives a local asset-optimization engine
//! over HTTP, and uploads the produced `-mobile.zip` artifacts and per-job
//! reports to object storage. One process is a single replica of a
//! horizontally-scaled fleet; coordination between replicas relies solely on
//! the queue's visibility timeout.
//!
//! # High-Level API
//!
//! The [`dispatcher`] module ties everything together:
//!
//! ```ignore
//! use mobilepack::config::Config;
//! use mobilepack::dispatcher::Dispatcher;
//!
//! let config = Config::from_env()?;
//! let dispatcher = Dispatcher::build(&config).await?;
//! dispatcher.run(shutdown).await;
//! ```

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod entity;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod monitoring;
pub mod notify;
pub mod pipeline;
pub mod profile;
pub mod queue;
pub mod storage;

/// Version of the MobilePack library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
