//! Completion notification publisher.
//!
//! After a job finishes, the worker publishes a completion event to an
//! external topic so downstream consumers can invalidate caches. The
//! publisher is optional: without a configured topic the no-op variant is
//! wired in and every publish silently succeeds.

use crate::config::NotifySettings;
use crate::entity::EntityType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while publishing a completion event.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Event published when a job completes, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    pub success: bool,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn new(entity_id: impl Into<String>, entity_type: EntityType, success: bool) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            success,
            finished_at: Utc::now(),
        }
    }
}

/// Publisher contract.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        event: &CompletionEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Publishes completion events to a notification topic.
#[derive(Debug, Clone)]
pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPublisher {
    /// Build the publisher from notify settings.
    ///
    /// # Panics
    ///
    /// Panics when called without a configured topic ARN; selection
    /// happens before construction.
    pub async fn from_settings(settings: &NotifySettings, region: Option<String>) -> Self {
        let topic_arn = settings
            .topic_arn
            .clone()
            .expect("SnsPublisher requires a configured topic ARN");

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_sns::config::Region::new(region));
        }
        let base = loader.load().await;

        let mut builder = aws_sdk_sns::config::Builder::from(&base);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_sns::Client::from_conf(builder.build()),
            topic_arn,
        }
    }
}

impl Publisher for SnsPublisher {
    async fn publish(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_string(event)?;
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .send()
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        info!(entity_id = %event.entity_id, success = event.success, "published completion event");
        Ok(())
    }
}

/// Publisher used when no topic is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    async fn publish(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        debug!(entity_id = %event.entity_id, "no topic configured, completion event dropped");
        Ok(())
    }
}

/// Statically-selected publisher.
#[derive(Debug, Clone)]
pub enum AnyPublisher {
    Sns(SnsPublisher),
    Noop(NoopPublisher),
}

impl AnyPublisher {
    /// Publish and swallow failures: notification problems must never fail
    /// a job that already produced its artifacts.
    pub async fn publish_best_effort(&self, event: &CompletionEvent) {
        let result = match self {
            Self::Sns(publisher) => publisher.publish(event).await,
            Self::Noop(publisher) => publisher.publish(event).await,
        };
        if let Err(error) = result {
            warn!(entity_id = %event.entity_id, error = %error, "completion publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_publisher_always_succeeds() {
        let publisher = NoopPublisher;
        let event = CompletionEvent::new("bafy", EntityType::Scene, true);
        publisher.publish(&event).await.unwrap();
    }

    #[test]
    fn test_completion_event_wire_names() {
        let event = CompletionEvent::new("bafy", EntityType::Wearable, false);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"entityId\":\"bafy\""));
        assert!(json.contains("\"entityType\":\"wearable\""));
        assert!(json.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn test_any_publisher_best_effort_does_not_panic() {
        let publisher = AnyPublisher::Noop(NoopPublisher);
        let event = CompletionEvent::new("bafy", EntityType::Emote, true);
        publisher.publish_best_effort(&event).await;
    }
}
