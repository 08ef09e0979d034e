//! Best-effort monitoring reporter.
//!
//! A fleet dashboard tracks every worker through periodic heartbeats and
//! per-job completion reports. Reporting is strictly best-effort: every
//! failure is swallowed and logged at debug level, and no report ever
//! blocks a pipeline for more than the 5-second call timeout.

use crate::config::MonitoringSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Interval between periodic heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Hard deadline for any single report call.
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker status as reported to the monitoring endpoint.
#[derive(Debug, Clone, Default)]
struct WorkerState {
    status: String,
    current_scene_id: Option<String>,
    current_step: Option<String>,
    progress_percent: Option<f32>,
    started_at: Option<DateTime<Utc>>,
    is_priority: Option<bool>,
}

#[derive(Debug, Serialize)]
struct HeartbeatBody<'a> {
    #[serde(rename = "consumerId")]
    consumer_id: &'a str,
    #[serde(rename = "processMethod")]
    process_method: &'a str,
    status: &'a str,
    #[serde(rename = "currentSceneId", skip_serializing_if = "Option::is_none")]
    current_scene_id: Option<&'a str>,
    #[serde(rename = "currentStep", skip_serializing_if = "Option::is_none")]
    current_step: Option<&'a str>,
    #[serde(rename = "progressPercent", skip_serializing_if = "Option::is_none")]
    progress_percent: Option<f32>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "isPriority", skip_serializing_if = "Option::is_none")]
    is_priority: Option<bool>,
    secret: &'a str,
}

#[derive(Debug, Serialize)]
struct JobCompleteBody<'a> {
    #[serde(rename = "sceneId")]
    scene_id: &'a str,
    status: &'a str,
    #[serde(rename = "startedAt")]
    started_at: DateTime<Utc>,
    #[serde(rename = "completedAt")]
    completed_at: DateTime<Utc>,
    #[serde(rename = "durationMs")]
    duration_ms: i64,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(rename = "isPriority", skip_serializing_if = "Option::is_none")]
    is_priority: Option<bool>,
    secret: &'a str,
}

struct Endpoint {
    url: String,
    secret: String,
}

struct Inner {
    endpoint: Option<Endpoint>,
    consumer_id: String,
    process_method: &'static str,
    client: reqwest::Client,
    state: Mutex<WorkerState>,
}

/// Reports heartbeats and job completions to the monitoring endpoint.
///
/// One consumer id (a process-lifetime UUID) identifies this worker across
/// all reports. Cloning shares the same state. When the endpoint is not
/// configured every method is a cheap no-op.
#[derive(Clone)]
pub struct MonitoringReporter {
    inner: Arc<Inner>,
}

impl MonitoringReporter {
    /// Build a reporter; inactive unless both url and secret are set.
    pub fn new(settings: &MonitoringSettings, process_method: &'static str) -> Self {
        let endpoint = match (&settings.url, &settings.secret) {
            (Some(url), Some(secret)) => Some(Endpoint {
                url: url.trim_end_matches('/').to_string(),
                secret: secret.clone(),
            }),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .expect("failed to create monitoring HTTP client");

        Self {
            inner: Arc::new(Inner {
                endpoint,
                consumer_id: Uuid::new_v4().to_string(),
                process_method,
                client,
                state: Mutex::new(WorkerState {
                    status: "starting".to_string(),
                    ..WorkerState::default()
                }),
            }),
        }
    }

    /// Process-lifetime consumer id.
    pub fn consumer_id(&self) -> &str {
        &self.inner.consumer_id
    }

    /// True when reports will actually be sent.
    pub fn is_active(&self) -> bool {
        self.inner.endpoint.is_some()
    }

    /// Start the periodic heartbeat task; runs until the token fires.
    pub fn start_heartbeat(&self, shutdown: CancellationToken) {
        if !self.is_active() {
            return;
        }

        let reporter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => reporter.send_heartbeat().await,
                }
            }
            debug!("heartbeat task stopped");
        });
    }

    /// Mark the worker idle between jobs.
    pub fn set_idle(&self) {
        self.update_state(|state| {
            state.status = "idle".to_string();
            state.current_scene_id = None;
            state.current_step = None;
            state.progress_percent = None;
            state.started_at = None;
            state.is_priority = None;
        });
    }

    /// Mark the worker as processing the given entity.
    pub fn set_processing(&self, scene_id: &str, is_priority: bool) {
        self.update_state(|state| {
            state.status = "processing".to_string();
            state.current_scene_id = Some(scene_id.to_string());
            state.current_step = None;
            state.progress_percent = Some(0.0);
            state.started_at = Some(Utc::now());
            state.is_priority = Some(is_priority);
        });
    }

    /// Update the current pipeline step and progress.
    pub fn set_step(&self, step: &str, progress_percent: f32) {
        self.update_state(|state| {
            state.current_step = Some(step.to_string());
            state.progress_percent = Some(progress_percent);
        });
    }

    /// Report one finished job.
    pub async fn job_complete(
        &self,
        scene_id: &str,
        success: bool,
        started_at: DateTime<Utc>,
        error_message: Option<&str>,
        is_priority: bool,
    ) {
        let Some(endpoint) = &self.inner.endpoint else {
            return;
        };

        let completed_at = Utc::now();
        let body = JobCompleteBody {
            scene_id,
            status: if success { "success" } else { "failed" },
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
            error_message,
            is_priority: Some(is_priority),
            secret: &endpoint.secret,
        };

        let url = format!("{}/api/monitoring/job-complete", endpoint.url);
        if let Err(error) = self.inner.client.post(&url).json(&body).send().await {
            debug!(error = %error, "job-complete report failed");
        }
    }

    /// Apply a state change and push one out-of-band heartbeat.
    fn update_state(&self, apply: impl FnOnce(&mut WorkerState)) {
        {
            let mut state = self.inner.state.lock().expect("monitoring state poisoned");
            apply(&mut state);
        }

        if self.is_active() {
            let reporter = self.clone();
            tokio::spawn(async move { reporter.send_heartbeat().await });
        }
    }

    async fn send_heartbeat(&self) {
        let Some(endpoint) = &self.inner.endpoint else {
            return;
        };

        let snapshot = {
            let state = self.inner.state.lock().expect("monitoring state poisoned");
            state.clone()
        };

        let body = HeartbeatBody {
            consumer_id: &self.inner.consumer_id,
            process_method: self.inner.process_method,
            status: &snapshot.status,
            current_scene_id: snapshot.current_scene_id.as_deref(),
            current_step: snapshot.current_step.as_deref(),
            progress_percent: snapshot.progress_percent,
            started_at: snapshot.started_at,
            is_priority: snapshot.is_priority,
            secret: &endpoint.secret,
        };

        let url = format!("{}/api/monitoring/heartbeat", endpoint.url);
        if let Err(error) = self.inner.client.post(&url).json(&body).send().await {
            debug!(error = %error, "heartbeat failed");
        }
    }
}
