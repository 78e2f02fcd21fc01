//! Per-provider admission control using the token bucket algorithm.
//!
//! Each provider id gets its own [`RateBucket`], created lazily on first
//! use. A bucket holds at most `capacity` tokens and gains one token per
//! `refill_interval`. Every admission takes one token.
//!
//! When a bucket is empty, [`OverflowPolicy`] decides what happens:
//!
//! - [`OverflowPolicy::Wait`] (default): the caller is suspended until the
//!   next refill and then tries again. Callers see latency, never an error.
//! - [`OverflowPolicy::Reject`]: the caller gets
//!   [`HeimdallError::RateLimited`] with a `retry_after` hint.
//!
//! The bucket map sits behind a mutex that is only held for the
//! refill-then-take step, never across a sleep. Waiters are not queued,
//! so admission order among concurrent waiters is unspecified.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::{HeimdallError, Result};

/// What to do when a bucket is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Suspend the caller until a token is available.
    #[default]
    Wait,
    /// Fail fast with `RateLimited`.
    Reject,
}

/// Capacity and refill rate of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    /// Maximum burst. Default: 60.
    pub capacity: u32,
    /// Time to regain one token. Default: 1s.
    pub refill_interval: Duration,
}

impl Default for BucketLimits {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_interval: Duration::from_secs(1),
        }
    }
}

/// Rate limiter configuration.
///
/// ```rust
/// # use heimdall::providers::rate_limit::{OverflowPolicy, RateLimitConfig};
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .capacity(30)
///     .refill_interval(Duration::from_millis(2000))
///     .provider_limit("anthropic", 10, Duration::from_secs(6))
///     .policy(OverflowPolicy::Reject);
/// assert_eq!(config.limits_for("anthropic").capacity, 10);
/// assert_eq!(config.limits_for("openai").capacity, 30);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RateLimitConfig {
    /// Limits for providers without an override.
    pub default_limits: BucketLimits,
    /// Per-provider overrides.
    pub providers: HashMap<String, BucketLimits>,
    pub policy: OverflowPolicy,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.default_limits.capacity = capacity;
        self
    }

    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.default_limits.refill_interval = interval;
        self
    }

    pub fn policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override limits for one provider.
    pub fn provider_limit(
        mut self,
        provider: impl Into<String>,
        capacity: u32,
        refill_interval: Duration,
    ) -> Self {
        self.providers.insert(
            provider.into(),
            BucketLimits {
                capacity,
                refill_interval,
            },
        );
        self
    }

    /// Limits that apply to `provider`.
    pub fn limits_for(&self, provider: &str) -> BucketLimits {
        self.providers
            .get(provider)
            .copied()
            .unwrap_or(self.default_limits)
    }

    /// Reject zero capacities and zero refill intervals.
    pub fn validate(&self) -> Result<()> {
        let all = std::iter::once(("default", &self.default_limits))
            .chain(self.providers.iter().map(|(k, v)| (k.as_str(), v)));
        for (name, limits) in all {
            if limits.capacity == 0 {
                return Err(HeimdallError::Configuration(format!(
                    "rate limit capacity for '{name}' must be at least 1"
                )));
            }
            if limits.refill_interval.is_zero() {
                return Err(HeimdallError::Configuration(format!(
                    "rate limit refill interval for '{name}' must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

/// Token bucket state for one provider.
#[derive(Debug, Clone)]
pub struct RateBucket {
    capacity: u32,
    remaining: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl RateBucket {
    /// A full bucket.
    pub fn new(limits: BucketLimits, now: Instant) -> Self {
        Self {
            capacity: limits.capacity,
            remaining: limits.capacity,
            refill_interval: limits.refill_interval,
            last_refill: now,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Add one token per whole interval elapsed, capped at capacity.
    ///
    /// `last_refill` advances by whole intervals only, so partial progress
    /// towards the next token is kept. A full bucket restarts its clock.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos().max(1);
        if intervals == 0 {
            return;
        }
        let missing = u128::from(self.capacity - self.remaining);
        if intervals >= missing {
            self.remaining = self.capacity;
            self.last_refill = now;
        } else {
            // intervals < capacity, so it fits in a u32
            let intervals = intervals as u32;
            self.remaining += intervals;
            self.last_refill += self.refill_interval * intervals;
        }
    }

    /// Take one token, or report how long until the next one.
    fn try_take(&mut self, now: Instant) -> std::result::Result<(), Duration> {
        self.refill(now);
        if self.remaining > 0 {
            self.remaining -= 1;
            Ok(())
        } else {
            Err((self.last_refill + self.refill_interval).saturating_duration_since(now))
        }
    }
}

/// Per-provider token bucket rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit one request for `provider`.
    ///
    /// Returns the time spent waiting for a refill (zero when a token was
    /// available). Under [`OverflowPolicy::Reject`] an empty bucket yields
    /// `RateLimited` instead of waiting.
    pub async fn acquire(&self, provider: &str) -> Result<Duration> {
        let mut waited = Duration::ZERO;
        loop {
            let wait = match self.try_acquire(provider) {
                Ok(()) => return Ok(waited),
                Err(wait) => wait,
            };
            match self.config.policy {
                OverflowPolicy::Reject => {
                    metrics::counter!(telemetry::RATE_LIMIT_REJECTIONS_TOTAL,
                        "provider" => provider.to_owned(),
                    )
                    .increment(1);
                    debug!(
                        provider,
                        retry_after_ms = wait.as_millis() as u64,
                        "rate limit exceeded"
                    );
                    return Err(HeimdallError::RateLimited {
                        retry_after: Some(wait),
                    });
                }
                OverflowPolicy::Wait => {
                    if waited.is_zero() {
                        metrics::counter!(telemetry::RATE_LIMIT_WAITS_TOTAL,
                            "provider" => provider.to_owned(),
                        )
                        .increment(1);
                    }
                    debug!(
                        provider,
                        wait_ms = wait.as_millis() as u64,
                        "waiting for rate limit refill"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Take a token without waiting; `Err` carries the time to the next refill.
    pub fn try_acquire(&self, provider: &str) -> std::result::Result<(), Duration> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(provider.to_owned())
            .or_insert_with(|| RateBucket::new(self.config.limits_for(provider), now))
            .try_take(now)
    }

    /// Tokens currently available for `provider`, after refill.
    ///
    /// `None` if the provider has not been seen yet.
    pub fn remaining(&self, provider: &str) -> Option<u32> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.get_mut(provider).map(|bucket| {
            bucket.refill(now);
            bucket.remaining()
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
