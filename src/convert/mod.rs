//! Conversions from raw provider output to normalized response types.
//!
//! This module is internal and handles the translation layer between what a
//! [`Provider`](crate::providers::Provider) returns and the task-shaped
//! [`Output`] callers see. Shape violations surface as transient errors so
//! the retry executor gets another go at the model.

use crate::providers::{RawOutput, RawUsage};
use crate::types::{ModelRef, Output, SafetyVerdict, Task, Usage};
use crate::{HeimdallError, Result};

/// Convert a raw provider result into the output shape `task` expects.
///
/// `inputs` is the number of texts an embedding request carried.
pub fn to_output(task: Task, raw: RawOutput, inputs: usize) -> Result<Output> {
    match task {
        Task::Embed => {
            let vectors = raw.embeddings.ok_or(HeimdallError::EmptyResponse)?;
            if vectors.len() != inputs {
                return Err(HeimdallError::MalformedResponse(format!(
                    "expected {inputs} embedding vectors, got {}",
                    vectors.len()
                )));
            }
            Ok(Output::Embeddings(vectors))
        }
        Task::Moderate => {
            let moderation = raw.moderation.ok_or_else(|| {
                HeimdallError::MalformedResponse("moderation result missing".into())
            })?;
            let verdict = if moderation.flagged {
                SafetyVerdict::block(moderation.categories)
            } else {
                SafetyVerdict {
                    allowed: true,
                    flags: moderation.categories,
                }
            };
            Ok(Output::Moderation(verdict))
        }
        _ => {
            let text = raw.text.unwrap_or_default();
            if text.trim().is_empty() {
                return Err(HeimdallError::EmptyResponse);
            }
            if task.expects_json() {
                let value = serde_json::from_str(strip_code_fence(&text))
                    .map_err(|e| HeimdallError::MalformedResponse(format!("invalid JSON: {e}")))?;
                Ok(Output::Json(value))
            } else {
                Ok(Output::Text(text))
            }
        }
    }
}

/// Convert provider token counts, pricing them with the model's cost table.
pub fn to_usage(raw: Option<RawUsage>, model: &ModelRef) -> Option<Usage> {
    raw.map(|raw| {
        let mut usage = Usage::new(raw.input_tokens, raw.output_tokens);
        usage.estimated_cost = model
            .cost
            .map(|cost| cost.estimate(raw.input_tokens, raw.output_tokens));
        usage
    })
}

/// Strip a surrounding markdown code fence (```json ... ```), if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    match body.split_once('\n') {
        Some((info, code)) if !info.trim().contains(char::is_whitespace) => code.trim(),
        _ => body.trim(),
    }
}
