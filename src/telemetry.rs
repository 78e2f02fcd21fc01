//! Telemetry metric name constants.
//!
//! Centralised metric names for gateway operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `task`: request task (e.g. "generate", "embed", "moderate")
//! - `provider`: provider id (e.g. "openai")
//! - `status`: outcome: "ok", "blocked" or "error"
//! - `stage`: safety stage: "pre" or "post"
//! - `direction`: token direction: "input" or "output"

/// Total routed requests.
///
/// Labels: `task`, `status` ("ok" | "blocked" | "error"), `cached` ("true" | "false").
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// Route duration in seconds, including cache hits.
///
/// Labels: `task`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "heimdall_tokens_total";

/// Total response cache hits.
///
/// Labels: `task`.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total response cache misses.
///
/// Labels: `task`.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Requests that joined an identical in-flight call instead of dispatching.
///
/// Labels: `task`.
pub const INFLIGHT_JOINS_TOTAL: &str = "heimdall_inflight_joins_total";

/// Requests blocked by the safety gate.
///
/// Labels: `stage` ("pre" | "post").
pub const SAFETY_BLOCKS_TOTAL: &str = "heimdall_safety_blocks_total";

/// Admissions that had to wait for a bucket refill.
///
/// Labels: `provider`.
pub const RATE_LIMIT_WAITS_TOTAL: &str = "heimdall_rate_limit_waits_total";

/// Admissions refused under the reject policy.
///
/// Labels: `provider`.
pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "heimdall_rate_limit_rejections_total";
