//! Task queue port.
//!
//! Two implementations share one contract: an in-memory channel queue used
//! by tests and the admin surface, and a cloud multi-queue backend with
//! priority ordering and round-robin fairness across entity-typed queues.
//!
//! One call to [`TaskQueue::consume_and_process`] is one poll step; the
//! dispatcher owns the loop. A delivery is acknowledged (deleted) only
//! after the handler returns - success or logical failure - so a crash
//! mid-job leaves the message to reappear after the visibility timeout.

mod envelope;
mod memory;
mod sqs;

pub use envelope::{decode_envelope, encode_envelope};
pub use memory::MemoryQueue;
pub use sqs::{MultiQueueConsumer, QueueTransport, RawMessage, SqsTransport, TypedQueue};

use crate::entity::Job;
use std::future::Future;
use thiserror::Error;

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend could not be reached or refused the call.
    #[error("queue backend error: {message}")]
    Backend { message: String },

    /// A message body did not decode into a job.
    #[error("undecodable queue message: {message}")]
    Decode { message: String },
}

/// Delivery handle for one received message.
///
/// The `receipt` token is opaque and required to acknowledge the delivery;
/// it is only valid while the visibility timeout holds.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub is_priority: bool,
    pub receipt: String,
    pub source_queue: String,
}

/// A failed job handler invocation.
///
/// Handler failures are counted and logged; the delivery is still
/// acknowledged. Duplicates are worse than loss for this workload: every
/// downstream consumer keys on content hashes and tolerates missing
/// artifacts, not conflicting ones.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerFailure(pub String);

/// Processes one decoded job.
pub trait JobHandler: Send + Sync {
    fn handle(
        &self,
        job: Job,
        message: &QueueMessage,
    ) -> impl Future<Output = Result<(), HandlerFailure>> + Send;
}

/// Uniform queue contract over both backends.
pub trait TaskQueue: Send + Sync {
    /// Publish one job; returns the backend's message id.
    fn publish(
        &self,
        job: &Job,
        priority: bool,
    ) -> impl Future<Output = Result<String, QueueError>> + Send;

    /// One poll step: receive at most one message, run the handler,
    /// acknowledge. Returns after at most one processed job (or one empty
    /// poll cycle).
    fn consume_and_process<H: JobHandler>(
        &self,
        handler: &H,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// Statically-selected queue backend.
#[derive(Debug)]
pub enum AnyQueue {
    Memory(MemoryQueue),
    Cloud(MultiQueueConsumer<SqsTransport>),
}

impl TaskQueue for AnyQueue {
    async fn publish(&self, job: &Job, priority: bool) -> Result<String, QueueError> {
        match self {
            Self::Memory(queue) => queue.publish(job, priority).await,
            Self::Cloud(queue) => queue.publish(job, priority).await,
        }
    }

    async fn consume_and_process<H: JobHandler>(&self, handler: &H) -> Result<(), QueueError> {
        match self {
            Self::Memory(queue) => queue.consume_and_process(handler).await,
            Self::Cloud(queue) => queue.consume_and_process(handler).await,
        }
    }
}
