//! Cloud multi-queue backend.
//!
//! Up to four queues feed one worker: a priority queue checked before
//! everything else, and entity-typed queues (scene, wearable, emote)
//! polled round-robin. The polling core is generic over [`QueueTransport`]
//! so the ordering rules are testable without a cloud endpoint.
//!
//! # Poll algorithm
//!
//! 1. If a priority queue is configured, short-receive it (wait <= 1 s).
//!    A message there is processed and acknowledged immediately.
//! 2. Otherwise round-robin the entity-typed queues starting at the
//!    cursor: short receives, except the final attempt which long-polls
//!    (<= 15 s).
//! 3. The first queue returning a message is served; the cursor advances
//!    past it.
//! 4. A fully-empty cycle still advances the cursor by one, so a queue
//!    that is consistently empty cannot pin the rotation.

use super::{
    decode_envelope, encode_envelope, HandlerFailure, JobHandler, QueueError, QueueMessage,
    TaskQueue,
};
use crate::config::QueueSettings;
use crate::entity::Job;
use crate::metrics;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Short receive used while scanning queues.
const SHORT_WAIT: Duration = Duration::from_secs(1);

/// Long poll used on the final queue of a scan.
const LONG_WAIT: Duration = Duration::from_secs(15);

/// Pause after a receive error before the next loop iteration.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// One raw delivery from a transport.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub receipt: String,
    pub body: String,
}

/// Backend seam under the multi-queue consumer.
///
/// `receive` returns at most one message (the backend is always asked for
/// one, keeping acknowledgment bookkeeping trivial) and sets its visibility
/// timeout at receive time.
pub trait QueueTransport: Send + Sync {
    fn receive(
        &self,
        queue_url: &str,
        wait: Duration,
        visibility: Duration,
    ) -> impl Future<Output = Result<Option<RawMessage>, QueueError>> + Send;

    fn delete(
        &self,
        queue_url: &str,
        receipt: &str,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn send(
        &self,
        queue_url: &str,
        body: &str,
    ) -> impl Future<Output = Result<String, QueueError>> + Send;
}

/// An entity-typed queue participating in the rotation.
#[derive(Debug, Clone)]
pub struct TypedQueue {
    pub name: String,
    pub url: String,
}

/// Priority-then-round-robin consumer over a set of queues.
#[derive(Debug)]
pub struct MultiQueueConsumer<T: QueueTransport> {
    transport: T,
    priority_queue: Option<String>,
    typed_queues: Vec<TypedQueue>,
    default_queue: String,
    visibility: Duration,
    /// Rotation cursor; per-worker by design, never shared across replicas.
    cursor: AtomicUsize,
}

impl<T: QueueTransport> MultiQueueConsumer<T> {
    /// Build a consumer over the configured queues.
    ///
    /// `default_queue` receives non-priority publishes and doubles as the
    /// scene rotation member.
    pub fn new(
        transport: T,
        default_queue: String,
        priority_queue: Option<String>,
        wearable_queue: Option<String>,
        emote_queue: Option<String>,
        visibility: Duration,
    ) -> Self {
        let mut typed_queues = vec![TypedQueue {
            name: "scene".to_string(),
            url: default_queue.clone(),
        }];
        if let Some(url) = wearable_queue {
            typed_queues.push(TypedQueue {
                name: "wearable".to_string(),
                url,
            });
        }
        if let Some(url) = emote_queue {
            typed_queues.push(TypedQueue {
                name: "emote".to_string(),
                url,
            });
        }

        Self {
            transport,
            priority_queue,
            typed_queues,
            default_queue,
            visibility,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Current rotation cursor (exposed for fairness assertions).
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    async fn process<H: JobHandler>(
        &self,
        handler: &H,
        queue_name: &str,
        queue_url: &str,
        raw: RawMessage,
        is_priority: bool,
    ) {
        let message = QueueMessage {
            id: raw.id,
            is_priority,
            receipt: raw.receipt,
            source_queue: queue_name.to_string(),
        };

        // Exactly one duration observation per delivery, decodable or not.
        let started = Instant::now();
        match decode_envelope(&raw.body) {
            Ok(job) => {
                info!(
                    entity_id = %job.entity_id,
                    entity_type = %job.entity_type,
                    queue = queue_name,
                    is_priority,
                    "processing job"
                );
                if let Err(HandlerFailure(reason)) = handler.handle(job, &message).await {
                    warn!(queue = queue_name, reason, "job handler failed");
                    metrics::record_handler_failure(queue_name.to_string());
                }
            }
            Err(decode_error) => {
                error!(queue = queue_name, error = %decode_error, "dropping undecodable message");
                metrics::record_handler_failure(queue_name.to_string());
            }
        }
        metrics::record_job_duration(queue_name.to_string(), started.elapsed().as_secs_f64());

        // Acknowledge after the handler returns, success or failure.
        if let Err(delete_error) = self.transport.delete(queue_url, &message.receipt).await {
            error!(queue = queue_name, error = %delete_error, "failed to acknowledge delivery");
        }
    }
}

impl<T: QueueTransport> TaskQueue for MultiQueueConsumer<T> {
    async fn publish(&self, job: &Job, priority: bool) -> Result<String, QueueError> {
        let (queue_name, queue_url) = match (&self.priority_queue, priority) {
            (Some(url), true) => ("priority", url.as_str()),
            _ => ("scene", self.default_queue.as_str()),
        };

        let body = encode_envelope(job)?;
        let id = self.transport.send(queue_url, &body).await?;
        metrics::record_enqueue(queue_name.to_string());
        info!(entity_id = %job.entity_id, queue = queue_name, message_id = %id, "published job");
        Ok(id)
    }

    async fn consume_and_process<H: JobHandler>(&self, handler: &H) -> Result<(), QueueError> {
        // Priority pre-emption: checked on every poll before the rotation.
        if let Some(url) = &self.priority_queue {
            match self.transport.receive(url, SHORT_WAIT, self.visibility).await {
                Ok(Some(raw)) => {
                    self.process(handler, "priority", url, raw, true).await;
                    return Ok(());
                }
                Ok(None) => {}
                Err(receive_error) => {
                    error!(error = %receive_error, "priority receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                    return Ok(());
                }
            }
        }

        let queue_count = self.typed_queues.len();
        if queue_count == 0 {
            return Ok(());
        }

        let start = self.cursor.load(Ordering::Relaxed) % queue_count;
        for offset in 0..queue_count {
            let index = (start + offset) % queue_count;
            let queue = &self.typed_queues[index];
            let wait = if offset == queue_count - 1 {
                LONG_WAIT
            } else {
                SHORT_WAIT
            };

            match self
                .transport
                .receive(&queue.url, wait, self.visibility)
                .await
            {
                Ok(Some(raw)) => {
                    // Advance past the served queue before processing so a
                    // panic inside the handler cannot stall the rotation.
                    self.cursor
                        .store((index + 1) % queue_count, Ordering::Relaxed);
                    self.process(handler, &queue.name, &queue.url, raw, false)
                        .await;
                    return Ok(());
                }
                Ok(None) => continue,
                Err(receive_error) => {
                    error!(queue = %queue.name, error = %receive_error, "receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                    return Ok(());
                }
            }
        }

        // Fully-empty cycle: advance by one so an always-empty queue at the
        // cursor cannot starve the others of the long poll.
        self.cursor.store((start + 1) % queue_count, Ordering::Relaxed);
        Ok(())
    }
}

/// Cloud queue transport.
#[derive(Debug, Clone)]
pub struct SqsTransport {
    client: aws_sdk_sqs::Client,
}

impl SqsTransport {
    /// Build a transport from queue settings (endpoint/region overrides).
    pub async fn from_settings(settings: &QueueSettings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &settings.aws_region {
            loader = loader.region(aws_sdk_sqs::config::Region::new(region.clone()));
        }
        let base = loader.load().await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&base);
        if let Some(endpoint) = &settings.aws_endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_sqs::Client::from_conf(builder.build()),
        }
    }
}

impl QueueTransport for SqsTransport {
    async fn receive(
        &self,
        queue_url: &str,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<RawMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait.as_secs() as i32)
            .visibility_timeout(visibility.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueError::Backend {
                message: e.to_string(),
            })?;

        let message = output.messages.unwrap_or_default().into_iter().next();
        Ok(message.and_then(|m| {
            let receipt = m.receipt_handle?;
            Some(RawMessage {
                id: m.message_id.unwrap_or_default(),
                receipt,
                body: m.body.unwrap_or_default(),
            })
        }))
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| QueueError::Backend {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn send(&self, queue_url: &str, body: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Backend {
                message: e.to_string(),
            })?;
        Ok(output.message_id.unwrap_or_default())
    }
}
