//! Moderation-model safety screen.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::SafetyPolicy;
use crate::providers::{Payload, Provider};
use crate::settings::Defaults;
use crate::types::{ModelRef, Request, SafetyVerdict};

/// Screens content with a moderation model.
///
/// Fails open: a provider error or a response without a moderation result
/// allows the content and logs a warning.
pub struct ClassifierPolicy {
    provider: Arc<dyn Provider>,
    model: ModelRef,
}

impl ClassifierPolicy {
    /// `model` should be a [`ModelKind::Moderate`](crate::ModelKind::Moderate)
    /// model served by `provider`.
    pub fn new(provider: Arc<dyn Provider>, model: ModelRef) -> Self {
        Self { provider, model }
    }

    async fn classify(&self, text: &str) -> SafetyVerdict {
        let payload = Payload::from_request(&Request::moderate(text), &Defaults::default());
        let cancel = CancellationToken::new();
        match self.provider.invoke(&self.model, &payload, &cancel).await {
            Ok(raw) => match raw.moderation {
                Some(moderation) if moderation.flagged => {
                    if moderation.categories.is_empty() {
                        SafetyVerdict::block(["flagged"])
                    } else {
                        SafetyVerdict::block(moderation.categories)
                    }
                }
                Some(_) => SafetyVerdict::allow(),
                None => {
                    warn!(
                        provider = self.provider.name(),
                        model = %self.model.model,
                        "moderation response carried no verdict, allowing"
                    );
                    SafetyVerdict::allow()
                }
            },
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    model = %self.model.model,
                    error = %e,
                    "moderation call failed, allowing"
                );
                SafetyVerdict::allow()
            }
        }
    }
}

#[async_trait]
impl SafetyPolicy for ClassifierPolicy {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn pre_check(&self, request: &Request) -> SafetyVerdict {
        match request.screened_text() {
            Some(text) => self.classify(text).await,
            None => SafetyVerdict::allow(),
        }
    }

    async fn post_check(&self, output: &str) -> SafetyVerdict {
        self.classify(output).await
    }
}
