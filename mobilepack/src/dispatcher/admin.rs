//! Thin HTTP admin surface.
//!
//! Operational glue, not part of the processing contract: a liveness
//! probe, a demo-job enqueue for the in-memory queue, artifact serving
//! from local storage, and the Prometheus scrape endpoint.

use crate::entity::{EntityType, Job};
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Component, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Demo scene enqueued by `POST /add-queue`.
const DEMO_ENTITY_ID: &str = "bafkreia2zikmtyfhcdczbja2cbsochmkjkwyz5eyqa4zbosxmiqxhkkpda";
const DEMO_CONTENT_SERVER: &str = "https://peer.decentraland.org/content";

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    /// Producer side of the in-memory queue; absent in cloud mode.
    pub enqueue: Option<UnboundedSender<Job>>,
    /// Directory the local storage backend writes to.
    pub storage_dir: PathBuf,
    /// Prometheus recorder handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the admin router.
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/add-queue", post(add_queue))
        .route("/storage/{*path}", get(serve_artifact))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Serve the admin router until the shutdown token fires.
pub async fn serve_admin(
    state: AdminState,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let router = admin_router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "admin surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn ping() -> &'static str {
    "pong"
}

async fn add_queue(State(state): State<AdminState>) -> StatusCode {
    let Some(sender) = &state.enqueue else {
        return StatusCode::CONFLICT;
    };

    let job = Job::new(DEMO_ENTITY_ID, EntityType::Scene, DEMO_CONTENT_SERVER);
    match sender.send(job) {
        Ok(()) => {
            info!(entity_id = DEMO_ENTITY_ID, "demo job enqueued");
            StatusCode::ACCEPTED
        }
        Err(send_error) => {
            warn!(error = %send_error, "demo enqueue failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn serve_artifact(
    State(state): State<AdminState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Vec<u8>, StatusCode> {
    let relative = PathBuf::from(&path);
    // Normal components only; anything traversal-shaped is rejected.
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let target = state.storage_dir.join(relative);
    tokio::fs::read(&target)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)
}

async fn render_metrics(State(state): State<AdminState>) -> Result<String, StatusCode> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::NOT_FOUND),
    }
}
