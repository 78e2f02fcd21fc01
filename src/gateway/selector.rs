//! Provider and model selection.
//!
//! Selection is a plain lookup: the configured model for the task, or a
//! built-in default on the settings' default provider. A forced provider
//! replaces the provider id and keeps the model name.

use crate::settings::Settings;
use crate::types::{ModelKind, ModelRef, Task};

/// Built-in chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Built-in embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
/// Built-in moderation model.
pub const DEFAULT_MODERATION_MODEL: &str = "omni-moderation-latest";

/// Resolve the model that serves `task`.
pub fn resolve(settings: &Settings, task: Task, force_provider: Option<&str>) -> ModelRef {
    let mut model = settings
        .per_task
        .get(&task)
        .cloned()
        .unwrap_or_else(|| default_model(&settings.default_provider, task));
    if let Some(provider) = force_provider {
        model.provider = provider.to_string();
    }
    model
}

/// Built-in model for `task` on `provider`.
pub fn default_model(provider: &str, task: Task) -> ModelRef {
    let kind = task.model_kind();
    let name = match kind {
        ModelKind::Chat => DEFAULT_CHAT_MODEL,
        ModelKind::Embed => DEFAULT_EMBED_MODEL,
        ModelKind::Moderate => DEFAULT_MODERATION_MODEL,
    };
    ModelRef::new(provider, name, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults() {
        let settings = Settings::default();
        let chat = resolve(&settings, Task::CoverLetter, None);
        assert_eq!(chat, ModelRef::new("openai", DEFAULT_CHAT_MODEL, ModelKind::Chat));
        assert_eq!(resolve(&settings, Task::Embed, None).model, DEFAULT_EMBED_MODEL);
        assert_eq!(
            resolve(&settings, Task::Moderate, None).kind,
            ModelKind::Moderate
        );
    }

    #[test]
    fn configured_model_wins() {
        let settings = Settings::default().model(
            Task::Parse,
            ModelRef::new("anthropic", "claude-haiku", ModelKind::Chat),
        );
        assert_eq!(resolve(&settings, Task::Parse, None).provider, "anthropic");
        assert_eq!(resolve(&settings, Task::Generate, None).provider, "openai");
    }

    #[test]
    fn forced_provider_keeps_model() {
        let settings = Settings::default().model(
            Task::Parse,
            ModelRef::new("anthropic", "claude-haiku", ModelKind::Chat),
        );
        let model = resolve(&settings, Task::Parse, Some("local"));
        assert_eq!(model.provider, "local");
        assert_eq!(model.model, "claude-haiku");
    }
}
