//! Provider capability.
//!
//! A [`Provider`] is the only thing that talks to an upstream model. It
//! receives a resolved [`ModelRef`] and a [`Payload`] (the request with
//! settings defaults applied) and returns a loosely-shaped [`RawOutput`];
//! the gateway's normalizer turns that into a [`Response`](crate::Response).
//!
//! # Error semantics
//!
//! Return transient errors (`Http`, `Timeout`, `RateLimited`, 5xx `Api`)
//! for conditions worth retrying and permanent ones (`AuthenticationFailed`,
//! `InvalidInput`, `Unsupported`, ...) for everything else. The retry
//! executor classifies with [`HeimdallError::is_transient`](crate::HeimdallError::is_transient).
//!
//! # Cancellation
//!
//! The gateway drops the `invoke` future when an attempt times out or the
//! gateway shuts down, and cancels the token first. Implementations that
//! spawn background work must stop it when the token fires.
//!
//! # Example
//!
//! ```ignore
//! async fn invoke(&self, model: &ModelRef, payload: &Payload, cancel: &CancellationToken)
//!     -> Result<RawOutput>
//! {
//!     if model.kind != ModelKind::Chat {
//!         return Err(HeimdallError::Unsupported { .. });
//!     }
//!     // ... perform the call
//! }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::settings::Defaults;
use crate::types::{ModelRef, Request, Task};

/// Upstream model invocation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider id; [`ModelRef::provider`] values are matched against it.
    fn name(&self) -> &str;

    /// Run one model call.
    async fn invoke(
        &self,
        model: &ModelRef,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<RawOutput>;
}

/// What a provider is asked to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub task: Task,
    pub system: Option<String>,
    pub prompt: Option<String>,
    pub texts: Vec<String>,
    /// Content to classify for [`Task::Moderate`].
    pub content: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    /// The caller wants a JSON document back.
    pub json_output: bool,
}

impl Payload {
    /// Apply configured defaults to a request.
    pub fn from_request(request: &Request, defaults: &Defaults) -> Self {
        Self {
            task: request.task,
            system: request.system.clone(),
            prompt: request.prompt.clone(),
            texts: request.texts.clone(),
            content: request
                .content_to_check
                .clone()
                .or_else(|| request.prompt.clone()),
            temperature: request.temperature.unwrap_or(defaults.temperature),
            max_tokens: request.max_tokens.or(defaults.max_tokens),
            stop: request.stop.clone(),
            json_output: request.task.expects_json(),
        }
    }
}

/// Provider result before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub text: Option<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub moderation: Option<RawModeration>,
    pub usage: Option<RawUsage>,
}

impl RawOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn embeddings(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            embeddings: Some(vectors),
            ..Self::default()
        }
    }

    pub fn moderation<I, S>(flagged: bool, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            moderation: Some(RawModeration {
                flagged,
                categories: categories.into_iter().map(Into::into).collect(),
            }),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(RawUsage {
            input_tokens,
            output_tokens,
        });
        self
    }
}

/// Moderation result as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawModeration {
    pub flagged: bool,
    /// Categories the provider flagged.
    pub categories: Vec<String>,
}

/// Token counts as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_applies_defaults() {
        let defaults = Defaults {
            temperature: 0.3,
            max_tokens: Some(512),
            ..Defaults::default()
        };
        let payload = Payload::from_request(
            &Request::new(Task::Parse).prompt("cv text"),
            &defaults,
        );
        assert_eq!(payload.temperature, 0.3);
        assert_eq!(payload.max_tokens, Some(512));
        assert!(payload.json_output);
        assert_eq!(payload.content.as_deref(), Some("cv text"));
    }

    #[test]
    fn payload_keeps_request_values() {
        let payload = Payload::from_request(
            &Request::new(Task::Generate)
                .prompt("hi")
                .temperature(0.9)
                .max_tokens(8),
            &Defaults::default(),
        );
        assert_eq!(payload.temperature, 0.9);
        assert_eq!(payload.max_tokens, Some(8));
        assert!(!payload.json_output);
    }
}
