//! Retrying HTTP fetcher.
//!
//! Every outbound call to the content server, the profile lambdas and the
//! monitoring endpoint goes through [`Fetcher`]: one pooled client with
//! transient-failure classification, exponential backoff with jitter, and
//! hard per-attempt deadlines.
//!
//! The optimization engine client deliberately does not use this module:
//! engine submissions must not be retried blindly (a duplicate submission
//! starts a duplicate batch).

mod backoff;
mod client;

pub use backoff::BackoffPolicy;
pub use client::{FetchOptions, Fetcher};

use thiserror::Error;

/// HTTP statuses that are retried with backoff.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// True when a status code warrants a retry.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Errors surfaced by the fetcher after its retry budget is spent.
///
/// `Timeout` is deliberately distinct from `Network` so callers can tell a
/// slow upstream from an unreachable one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The per-attempt deadline fired on the final attempt.
    #[error("request to {url} timed out after {attempts} attempts")]
    Timeout { url: String, attempts: u32 },

    /// A connection-level failure persisted through every attempt.
    #[error("network error for {url} after {attempts} attempts: {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    /// A retryable status persisted through every attempt.
    #[error("{url} kept returning {status} through {attempts} attempts")]
    ExhaustedStatus {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// The caller asked for a decoded body and it did not parse.
    #[error("invalid response body from {url}: {message}")]
    InvalidBody { url: String, message: String },

    /// A non-retryable non-2xx for callers that require success.
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    /// Request could not be built (bad method/header/url).
    #[error("invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [200, 201, 301, 400, 401, 403, 404, 410, 501] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }
}
