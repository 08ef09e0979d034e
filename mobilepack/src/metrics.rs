//! Prometheus metrics helpers for the worker.
//!
//! Provides centralized metrics initialization and the metric definitions
//! used by the queue port and pipelines.
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`queue_`, `pipeline_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - The `queue` label carries the source queue name

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder for this process.
///
/// Returns the handle the admin router's `/metrics` endpoint renders
/// from, or `None` when a recorder is already installed (a second worker
/// in the same test process, for example). Recording through the facade
/// works either way; without a recorder the macros are no-ops.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_worker_metrics();
    Some(handle)
}

/// Register descriptions for the worker's metrics.
fn register_worker_metrics() {
    describe_counter!(
        "queue_enqueue_total",
        "Jobs published to a task queue (label: queue)"
    );
    describe_counter!(
        "queue_failures_total",
        "Job handler failures per queue (label: queue)"
    );
    describe_histogram!(
        "queue_duration_seconds",
        "Wall-clock processing time per delivered job (label: queue)"
    );
    describe_counter!(
        "pipeline_assets_total",
        "Individual assets submitted to the optimization engine"
    );
    describe_counter!(
        "pipeline_asset_failures_total",
        "Individual assets that failed optimization"
    );
}

/// Record one processed delivery for a queue.
///
/// Exactly one observation is recorded per delivery, success or failure.
pub fn record_job_duration(queue: String, seconds: f64) {
    metrics::histogram!("queue_duration_seconds", "queue" => queue).record(seconds);
}

/// Count one published job.
pub fn record_enqueue(queue: String) {
    metrics::counter!("queue_enqueue_total", "queue" => queue).increment(1);
}

/// Count one handler failure.
pub fn record_handler_failure(queue: String) {
    metrics::counter!("queue_failures_total", "queue" => queue).increment(1);
}
