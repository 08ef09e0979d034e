//! Notification-over-queue message envelope.
//!
//! The producer publishes through a notification topic, so queue bodies
//! arrive as `{"Message": "<json-escaped job>"}`. The decoder accepts both
//! the envelope and a directly-published job for robustness against
//! producer variations.

use super::QueueError;
use crate::entity::Job;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

/// Wrap a job in the notification envelope for publishing.
pub fn encode_envelope(job: &Job) -> Result<String, QueueError> {
    let payload = serde_json::to_string(job).map_err(|e| QueueError::Decode {
        message: e.to_string(),
    })?;
    serde_json::to_string(&serde_json::json!({ "Message": payload })).map_err(|e| {
        QueueError::Decode {
            message: e.to_string(),
        }
    })
}

/// Decode a queue body into a job, unwrapping the envelope when present.
pub fn decode_envelope(body: &str) -> Result<Job, QueueError> {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        return serde_json::from_str(&envelope.message).map_err(|e| QueueError::Decode {
            message: format!("envelope payload: {e}"),
        });
    }

    serde_json::from_str(body).map_err(|e| QueueError::Decode {
        message: format!("direct payload: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn test_job() -> Job {
        Job::new("bafyscene", EntityType::Scene, "https://content.example")
    }

    #[test]
    fn test_encode_then_decode_is_identity() {
        let job = test_job();
        let body = encode_envelope(&job).unwrap();
        let decoded = decode_envelope(&body).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_encoded_form_is_enveloped() {
        let body = encode_envelope(&test_job()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let inner = value["Message"].as_str().expect("Message is a string");
        assert!(inner.contains("\"entityId\""));
    }

    #[test]
    fn test_decode_accepts_direct_job() {
        let direct = serde_json::to_string(&test_job()).unwrap();
        let decoded = decode_envelope(&direct).unwrap();
        assert_eq!(decoded.entity_id, "bafyscene");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_envelope("not json").is_err());
        assert!(decode_envelope("{\"Message\": \"not json either\"}").is_err());
        assert!(decode_envelope("{}").is_err());
    }

    #[test]
    fn test_decode_preserves_entity_type() {
        let mut job = test_job();
        job.entity_type = EntityType::Emote;
        let body = encode_envelope(&job).unwrap();
        assert_eq!(decode_envelope(&body).unwrap().entity_type, EntityType::Emote);
    }
}
