//! Retry configuration, delay calculation, and the shared retry helper.
//!
//! [`with_retry()`] wraps any fallible async operation with bounded
//! exponential backoff. Only transient errors (as classified by
//! [`HeimdallError::is_transient()`]) are retried; permanent errors return
//! on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::telemetry;
use crate::types::RetryOverride;
use crate::{HeimdallError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Pure exponential backoff, no jitter:
///
/// ```rust
/// # use heimdall::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<RetryOverride> for RetryConfig {
    fn from(retry: RetryOverride) -> Self {
        Self::new()
            .max_attempts(retry.attempts)
            .initial_delay(retry.backoff)
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    ///
    /// If a `retry_after` duration is provided (from a `RateLimited` error),
    /// it takes precedence over the calculated backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors up to `config.max_attempts`, sleeping
/// [`RetryConfig::effective_delay`] after every transient failure, the
/// final one included, so `n` failed attempts wait
/// `initial_delay * (2^n - 1)` in total. Returns the last error once
/// attempts are exhausted.
///
/// Permanent errors are returned immediately without retry. A
/// `max_attempts` of zero is treated as one.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                let delay = config.effective_delay(attempt, e.retry_after());
                if attempt + 1 < max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL,
                        "provider" => provider_name.to_owned(),
                        "operation" => operation.to_owned(),
                    )
                    .increment(1);
                    warn!(
                        provider = provider_name,
                        operation,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                } else {
                    warn!(
                        provider = provider_name,
                        operation,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempts exhausted, backing off before giving up"
                    );
                }
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent error, no retry
        }
    }
    Err(last_err.unwrap_or_else(|| HeimdallError::NoProvider(provider_name.to_owned())))
}
