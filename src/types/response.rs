//! Normalized gateway response

use serde::{Deserialize, Serialize};

use super::model::ModelRef;
use super::safety::{SafetyStage, SafetyVerdict};
use crate::HeimdallError;

/// What a routed request produces, whatever happened along the way.
///
/// Failures are data, not errors: feature services inspect `ok` and fall
/// back to their own neutral default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Served from the cache without a fresh provider call.
    #[serde(default)]
    pub cached: bool,
    /// Safety or moderation categories attached to this response.
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

/// Task-shaped payload of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Output {
    Text(String),
    Json(serde_json::Value),
    /// One vector per input text, in input order.
    Embeddings(Vec<Vec<f32>>),
    Moderation(SafetyVerdict),
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            estimated_cost: None,
        }
    }
}

/// Why a response is not `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Failure {
    /// The safety gate rejected the input or the output. Final.
    SafetyBlocked { stage: SafetyStage },
    /// The provider failed and retries (if any) were exhausted.
    Provider { message: String, retriable: bool },
    /// Every attempt ran past its timeout.
    Timeout { after_ms: u64 },
    /// The rate limiter refused admission (reject policy only).
    RateLimited { retry_after_ms: Option<u64> },
    /// No provider is registered under the resolved id.
    NoProvider { provider: String },
    /// The gateway was shut down while the request was pending.
    Cancelled,
}

impl From<&HeimdallError> for Failure {
    fn from(err: &HeimdallError) -> Self {
        match err {
            HeimdallError::Timeout { after } => Failure::Timeout {
                after_ms: after.as_millis() as u64,
            },
            HeimdallError::RateLimited { retry_after } => Failure::RateLimited {
                retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            },
            HeimdallError::NoProvider(provider) => Failure::NoProvider {
                provider: provider.clone(),
            },
            HeimdallError::Cancelled => Failure::Cancelled,
            other => Failure::Provider {
                message: other.to_string(),
                retriable: other.is_transient(),
            },
        }
    }
}

impl Response {
    /// Successful provider result.
    ///
    /// A moderation output makes `ok` mirror the verdict.
    pub(crate) fn success(model: &ModelRef, output: Output, usage: Option<Usage>) -> Self {
        let (ok, flags) = match &output {
            Output::Moderation(verdict) => (verdict.allowed, verdict.flags.clone()),
            _ => (true, Vec::new()),
        };
        Self {
            ok,
            provider: Some(model.provider.clone()),
            model: Some(model.model.clone()),
            output: Some(output),
            usage,
            cached: false,
            flags,
            failure: None,
        }
    }

    /// Rejected by the safety gate.
    pub(crate) fn blocked(
        stage: SafetyStage,
        verdict: SafetyVerdict,
        model: Option<&ModelRef>,
    ) -> Self {
        Self {
            ok: false,
            provider: model.map(|m| m.provider.clone()),
            model: model.map(|m| m.model.clone()),
            flags: verdict.flags,
            failure: Some(Failure::SafetyBlocked { stage }),
            ..Self::default()
        }
    }

    /// Dispatch failed with `err`.
    pub(crate) fn failed(err: &HeimdallError, model: Option<&ModelRef>) -> Self {
        Self {
            ok: false,
            provider: model.map(|m| m.provider.clone()),
            model: model.map(|m| m.model.clone()),
            failure: Some(Failure::from(err)),
            ..Self::default()
        }
    }

    /// Copy of this response marked as served from the cache.
    pub(crate) fn into_cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Generated text, if the output is text.
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Some(Output::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Structured output, if the task produced JSON.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.output {
            Some(Output::Json(value)) => Some(value),
            _ => None,
        }
    }

    /// Embedding vectors, if the task was [`Task::Embed`](crate::Task::Embed).
    pub fn embeddings(&self) -> Option<&[Vec<f32>]> {
        match &self.output {
            Some(Output::Embeddings(vectors)) => Some(vectors),
            _ => None,
        }
    }

    /// Moderation verdict, if the task was [`Task::Moderate`](crate::Task::Moderate).
    pub fn verdict(&self) -> Option<&SafetyVerdict> {
        match &self.output {
            Some(Output::Moderation(verdict)) => Some(verdict),
            _ => None,
        }
    }
}

impl Output {
    /// Text the post-check screens, if this output carries any.
    pub(crate) fn screenable_text(&self) -> Option<String> {
        match self {
            Output::Text(text) => Some(text.clone()),
            Output::Json(value) => Some(value.to_string()),
            Output::Embeddings(_) | Output::Moderation(_) => None,
        }
    }
}
