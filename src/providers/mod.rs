//! Provider capability and the machinery around every provider call.
//!
//! - [`traits`]: the [`Provider`] trait the gateway dispatches through.
//! - [`retry`]: bounded exponential backoff over transient errors.
//! - [`rate_limit`]: per-provider token bucket admission.
//! - `openai`: OpenAI-compatible HTTP client (feature `openai`).

pub mod rate_limit;
pub mod retry;
pub mod traits;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
pub use rate_limit::{BucketLimits, OverflowPolicy, RateBucket, RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, with_retry};
pub use traits::{Payload, Provider, RawModeration, RawOutput, RawUsage};
