//! In-memory queue backend.
//!
//! A FIFO channel with no acknowledgment step, used when no cloud queue is
//! configured. Jobs enter through [`MemoryQueue::publish`] or the admin
//! surface's enqueue route.

use super::{HandlerFailure, JobHandler, QueueError, QueueMessage, TaskQueue};
use crate::entity::Job;
use crate::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// How long one empty poll step blocks before yielding to the loop.
const POLL_WAIT: Duration = Duration::from_secs(1);

/// FIFO in-memory task queue.
#[derive(Debug)]
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<mpsc::UnboundedReceiver<Job>>,
    handler_failures: AtomicU64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Producer handle for the admin surface.
    pub fn sender(&self) -> mpsc::UnboundedSender<Job> {
        self.tx.clone()
    }

    /// Handler failures observed so far.
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for MemoryQueue {
    async fn publish(&self, job: &Job, _priority: bool) -> Result<String, QueueError> {
        self.tx
            .send(job.clone())
            .map_err(|e| QueueError::Backend {
                message: format!("channel closed: {e}"),
            })?;
        metrics::record_enqueue("memory".to_string());
        Ok(Uuid::new_v4().to_string())
    }

    async fn consume_and_process<H: JobHandler>(&self, handler: &H) -> Result<(), QueueError> {
        let job = {
            let mut rx = self.rx.lock().await;
            match tokio::time::timeout(POLL_WAIT, rx.recv()).await {
                Ok(Some(job)) => job,
                // Channel closed or empty poll - both are a quiet step.
                Ok(None) | Err(_) => return Ok(()),
            }
        };

        let message = QueueMessage {
            id: Uuid::new_v4().to_string(),
            is_priority: false,
            receipt: String::new(),
            source_queue: "memory".to_string(),
        };

        info!(entity_id = %job.entity_id, entity_type = %job.entity_type, "processing job");
        let started = Instant::now();
        let result = handler.handle(job, &message).await;
        metrics::record_job_duration("memory".to_string(), started.elapsed().as_secs_f64());

        if let Err(HandlerFailure(reason)) = result {
            self.handler_failures.fetch_add(1, Ordering::Relaxed);
            metrics::record_handler_failure("memory".to_string());
            warn!(reason, "job handler failed");
        }

        Ok(())
    }
}
