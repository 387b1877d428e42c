//! Retry with exponential backoff for outbound calls.
//!
//! Only errors for which [`Error::is_retryable`] holds are retried; contract
//! and validation failures are returned on the first attempt.
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Random jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_percent: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter_percent: 0.1,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter_percent: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            jitter_percent: jitter_percent.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no delay. Used by tests and offline doubles.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0, 0.0, 1)
    }

    /// Delay to wait after the given 0-indexed failed attempt.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exp = i32::try_from(attempt.min(31)).unwrap_or(31);
        let base_ms = (initial_ms as f64) * self.backoff_factor.powi(exp);
        let base_ms = base_ms.min(max_ms as f64);

        let jitter = if self.jitter_percent > 0.0 && base_ms > 0.0 {
            let range = base_ms * self.jitter_percent;
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };

        let delay_ms = (base_ms + jitter).clamp(0.0, max_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of attempts. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(op = label, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(op = label, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
