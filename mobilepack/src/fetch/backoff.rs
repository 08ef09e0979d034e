//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Backoff schedule for retried requests.
///
/// The delay before retry `n` (zero-based) is
/// `min(initial * multiplier^n, max)` plus uniform jitter in
/// `[0, 25%]` of that delay.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy from the fetcher settings.
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
        }
    }

    /// Base delay for a zero-based attempt index, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = (self.initial.as_millis() as f64 * factor).round() as u64;
        Duration::from_millis(millis).min(self.max)
    }

    /// Delay for a zero-based attempt index, with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_fraction: f64 = rand::rng().random_range(0.0..=0.25);
        let jitter = Duration::from_millis((base.as_millis() as f64 * jitter_fraction) as u64);
        base + jitter
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(30))
    }
}
