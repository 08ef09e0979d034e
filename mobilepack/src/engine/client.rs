//! HTTP client for the engine's control API.

use super::types::{
    BatchStatus, ProcessAssetsRequest, ProcessAssetsResponse, ProcessSceneRequest,
    ProcessSceneResponse,
};
use super::{EngineApi, EngineError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Deadline for control calls (submissions and status polls).
///
/// Deliberately short: the long wait happens in `wait_for_completion`,
/// not inside individual HTTP calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin client over the engine's local HTTP API.
///
/// Submissions are never retried here: a duplicate submission starts a
/// duplicate batch. Transient-looking failures surface to the pipeline,
/// which records them and moves on.
#[derive(Debug, Clone)]
pub struct EngineClient {
    base_url: String,
    client: reqwest::Client,
}

impl EngineClient {
    /// Create a client for the engine at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .build()
            .expect("failed to create engine HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, EngineError> {
        let url = self.url(path);
        trace!(url, "engine submission");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

impl EngineApi for EngineClient {
    async fn is_ready(&self) -> bool {
        let url = self.url("/health");
        match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(error = %error, "engine health probe failed");
                false
            }
        }
    }

    async fn process_scene(
        &self,
        request: &ProcessSceneRequest,
    ) -> Result<ProcessSceneResponse, EngineError> {
        self.post("/process-scene", request).await
    }

    async fn process_assets(
        &self,
        request: &ProcessAssetsRequest,
    ) -> Result<ProcessAssetsResponse, EngineError> {
        self.post("/process", request).await
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, EngineError> {
        let url = self.url(&format!("/status/{batch_id}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<BatchStatus>()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = EngineClient::new("http://localhost:8080/");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");

        let client = EngineClient::new("http://localhost:8080");
        assert_eq!(
            client.url("/status/b-1"),
            "http://localhost:8080/status/b-1"
        );
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineClient>();
    }

    #[tokio::test]
    async fn test_is_ready_false_when_unreachable() {
        // Reserved port with nothing listening.
        let client = EngineClient::new("http://127.0.0.1:1");
        assert!(!client.is_ready().await);
    }
}
