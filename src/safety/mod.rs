//! Two-stage content screening.
//!
//! The gateway asks its [`SafetyPolicy`] twice per provider call: once on
//! the request input before anything is dispatched, once on the textual
//! model output before it is returned or cached. A disallowed verdict is
//! final; it is never retried.
//!
//! Implementations:
//! - [`HeuristicPolicy`]: case-insensitive regex rules per category.
//! - [`ClassifierPolicy`]: delegates to a moderation model.
//! - [`AllowAll`]: lets everything through.
//!
//! Policies fail open: when a screen cannot reach a decision it allows the
//! content and logs a warning.

mod classifier;
mod heuristic;

pub use classifier::ClassifierPolicy;
pub use heuristic::{HeuristicPolicy, SafetyRule};

use async_trait::async_trait;

use crate::types::{Request, SafetyVerdict};

/// Pluggable safety screen.
#[async_trait]
pub trait SafetyPolicy: Send + Sync {
    /// Policy name for logs.
    fn name(&self) -> &str;

    /// Screen the request input (`content_to_check`, falling back to `prompt`).
    async fn pre_check(&self, request: &Request) -> SafetyVerdict;

    /// Screen generated text.
    async fn post_check(&self, output: &str) -> SafetyVerdict;
}

/// Policy that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl SafetyPolicy for AllowAll {
    fn name(&self) -> &str {
        "allow_all"
    }

    async fn pre_check(&self, _request: &Request) -> SafetyVerdict {
        SafetyVerdict::allow()
    }

    async fn post_check(&self, _output: &str) -> SafetyVerdict {
        SafetyVerdict::allow()
    }
}
