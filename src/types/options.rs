//! Per-call routing options

use std::time::Duration;

/// Options for a single [`route`](crate::Gateway::route) call.
///
/// Unset fields fall back to the gateway's [`Settings`](crate::Settings).
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Read from and write to the response cache. Default: `true`.
    pub allow_cache: bool,
    /// Provider id that overrides the configured one for this task.
    pub force_provider: Option<String>,
    /// Bound on each provider attempt.
    pub timeout: Option<Duration>,
    pub retry: Option<RetryOverride>,
    /// Lifetime of the cached response.
    pub cache_ttl: Option<Duration>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            allow_cache: true,
            force_provider: None,
            timeout: None,
            retry: None,
            cache_ttl: None,
        }
    }
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that bypass the cache entirely.
    pub fn uncached() -> Self {
        Self::default().allow_cache(false)
    }

    pub fn allow_cache(mut self, allow: bool) -> Self {
        self.allow_cache = allow;
        self
    }

    pub fn force_provider(mut self, provider: impl Into<String>) -> Self {
        self.force_provider = Some(provider.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry = Some(RetryOverride { attempts, backoff });
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Per-call replacement for the configured retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOverride {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub backoff: Duration,
}
