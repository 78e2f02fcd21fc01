//! Model references and pricing

use serde::{Deserialize, Serialize};

/// What a model is able to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Chat,
    Embed,
    Moderate,
}

/// Price per 1,000 tokens, in the caller's currency of choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenCost {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TokenCost {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Estimated cost of a call with the given token counts.
    pub fn estimate(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        f64::from(input_tokens) / 1000.0 * self.input_per_1k
            + f64::from(output_tokens) / 1000.0 * self.output_per_1k
    }
}

/// Which upstream model serves a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider id, matched against [`Provider::name`](crate::providers::Provider::name).
    pub provider: String,
    /// Provider-specific model name.
    pub model: String,
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<TokenCost>,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind,
            cost: None,
        }
    }

    pub fn with_cost(mut self, cost: TokenCost) -> Self {
        self.cost = Some(cost);
        self
    }
}
