//! Pooled, retrying HTTP client.

use super::{is_retryable_status, BackoffPolicy, FetchError};
use crate::config::FetchSettings;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Maximum concurrent requests to any single host.
const MAX_CONNECTIONS_PER_HOST: usize = 10;

/// Idle keep-alive connections retained per host.
const MAX_IDLE_PER_HOST: usize = 5;

/// Idle connection lifetime before the pool drops it.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-call options for [`Fetcher::fetch`].
///
/// Unset fields inherit the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// HTTP method; GET when unset.
    pub method: Option<Method>,
    /// Additional request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Per-attempt deadline override.
    pub timeout: Option<Duration>,
    /// Retry budget override (retries after the first attempt).
    pub max_retries: Option<u32>,
}

impl FetchOptions {
    /// Options for a JSON POST.
    pub fn json_post(body: Vec<u8>) -> Self {
        Self {
            method: Some(Method::POST),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
            ..Self::default()
        }
    }
}

/// HTTP client with pooled keep-alive connections and retry-with-backoff.
///
/// One instance is shared by every component that talks to external HTTP
/// services. Cloning is cheap; the underlying pool is shared.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    backoff: BackoffPolicy,
    host_limits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Fetcher {
    /// Build a fetcher from the configured tuning values.
    pub fn new(settings: FetchSettings) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .expect("failed to create HTTP client");

        let backoff = BackoffPolicy::new(
            settings.initial_delay,
            settings.backoff_multiplier,
            settings.max_delay,
        );

        Self {
            client,
            settings,
            backoff,
            host_limits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Perform a request, retrying transient failures with backoff.
    ///
    /// Retries network-level failures and the retryable status set
    /// (408/429/5xx-transient). Any other non-2xx response is returned to
    /// the caller unchanged. When the retry budget is spent, the error of
    /// the final attempt wins, with timeouts kept distinct from network
    /// failures.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<Response, FetchError> {
        let max_retries = options.max_retries.unwrap_or(self.settings.max_retries);
        let timeout = options.timeout.unwrap_or(self.settings.timeout);
        let method = options.method.clone().unwrap_or(Method::GET);
        let total_attempts = max_retries + 1;

        let _host_permit = self.acquire_host_permit(url).await;

        let mut last_failure: Option<AttemptFailure> = None;
        for attempt in 0..total_attempts {
            if attempt > 0 {
                let delay = self.backoff.jittered_delay(attempt - 1);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url).timeout(timeout);
            for (name, value) in &options.headers {
                request = request.header(name, value);
            }
            if let Some(body) = &options.body {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !is_retryable_status(status) {
                        return Ok(response);
                    }

                    warn!(url, status, attempt, "retryable status");
                    // Drain the body so the connection returns to the pool
                    // before we sleep.
                    let _ = response.bytes().await;
                    last_failure = Some(AttemptFailure::Status(status));
                }
                Err(error) => match classify_error(&error) {
                    ErrorClass::Timeout => {
                        warn!(url, attempt, "attempt timed out");
                        last_failure = Some(AttemptFailure::Timeout);
                    }
                    ErrorClass::Network(message) => {
                        warn!(url, attempt, error = %message, "network error");
                        last_failure = Some(AttemptFailure::Network(message));
                    }
                    ErrorClass::Terminal(message) => {
                        return Err(FetchError::InvalidRequest {
                            url: url.to_string(),
                            message,
                        });
                    }
                },
            }
        }

        Err(match last_failure {
            Some(AttemptFailure::Timeout) => FetchError::Timeout {
                url: url.to_string(),
                attempts: total_attempts,
            },
            Some(AttemptFailure::Network(message)) => FetchError::Network {
                url: url.to_string(),
                attempts: total_attempts,
                message,
            },
            Some(AttemptFailure::Status(status)) => FetchError::ExhaustedStatus {
                url: url.to_string(),
                status,
                attempts: total_attempts,
            },
            // Unreachable: the loop always runs at least once.
            None => FetchError::Timeout {
                url: url.to_string(),
                attempts: 0,
            },
        })
    }

    /// GET a URL and decode its JSON body, requiring a 2xx status.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.fetch(url, FetchOptions::default()).await?;
        self.decode_json(url, response).await
    }

    /// POST a JSON body and decode the JSON response, requiring 2xx.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, FetchError> {
        let encoded = serde_json::to_vec(body).map_err(|e| FetchError::InvalidRequest {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let response = self.fetch(url, FetchOptions::json_post(encoded)).await?;
        self.decode_json(url, response).await
    }

    async fn decode_json<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Response,
    ) -> Result<T, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::InvalidBody {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    /// Cap concurrent requests per host.
    ///
    /// reqwest pools idle connections but does not bound in-flight
    /// connections, so the bound lives here.
    async fn acquire_host_permit(&self, url: &str) -> Option<tokio::sync::OwnedSemaphorePermit> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))?;

        let semaphore = {
            let mut limits = self.host_limits.lock().expect("host limit lock poisoned");
            Arc::clone(
                limits
                    .entry(host)
                    .or_insert_with(|| Arc::new(Semaphore::new(MAX_CONNECTIONS_PER_HOST))),
            )
        };

        semaphore.acquire_owned().await.ok()
    }
}

enum AttemptFailure {
    Timeout,
    Network(String),
    Status(u16),
}

enum ErrorClass {
    Timeout,
    Network(String),
    Terminal(String),
}

/// Sort a transport error into retry classes.
fn classify_error(error: &reqwest::Error) -> ErrorClass {
    if error.is_timeout() {
        return ErrorClass::Timeout;
    }
    if error.is_connect() {
        return ErrorClass::Network(error.to_string());
    }
    if error.is_builder() || error.is_redirect() {
        return ErrorClass::Terminal(error.to_string());
    }

    // Walk the source chain for OS-level failures that arrive mid-request
    // (reset, broken pipe, unreachable host).
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if is_retryable_io_kind(io.kind()) {
                return ErrorClass::Network(io.to_string());
            }
        }
        source = inner.source();
    }

    // Name resolution failures do not expose a stable error type.
    let message = error.to_string();
    if message.contains("dns error") || message.contains("failed to lookup") {
        return ErrorClass::Network(message);
    }

    ErrorClass::Terminal(message)
}

fn is_retryable_io_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
    )
}
