//! Heimdall error types

use std::time::Duration;

/// Heimdall error types
///
/// These never cross the [`route`](crate::Gateway::route) boundary: the
/// gateway folds them into a [`Failure`](crate::Failure) on the response.
/// They are public because [`Provider`](crate::providers::Provider)
/// implementations and the retry executor speak them.
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Data errors
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no provider registered under '{0}'")]
    NoProvider(String),

    #[error("provider '{provider}' does not support task '{task}'")]
    Unsupported { provider: String, task: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("gateway is shutting down")]
    Cancelled,
}

impl HeimdallError {
    /// Whether the error is worth retrying.
    ///
    /// Network failures, timeouts, rate limits, server-side status codes and
    /// unparseable responses are transient. Everything describing a bad
    /// request or a bad setup is permanent and fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            HeimdallError::Http(_)
            | HeimdallError::Timeout { .. }
            | HeimdallError::RateLimited { .. }
            | HeimdallError::MalformedResponse(_)
            | HeimdallError::EmptyResponse => true,
            HeimdallError::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HeimdallError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
