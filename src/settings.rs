//! Runtime settings the gateway reads at the start of every route.
//!
//! [`Settings`] is a plain value. The gateway never holds on to it between
//! calls: it asks its [`SettingsSource`] for a fresh snapshot each time, so
//! an owner holding a [`SharedSettings`] handle can swap models, toggle the
//! cache or the safety gate without rebuilding the gateway.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::types::{ModelRef, Task};

/// Request defaults applied when a [`Request`](crate::Request) leaves a
/// field unset.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,
    /// Completion token limit. Default: provider's own limit.
    pub max_tokens: Option<u32>,
    /// Bound on each provider attempt. Default: 30s.
    pub timeout: Duration,
    /// Total attempts per call, including the first. Default: 3.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles after each one. Default: 500ms.
    pub backoff: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Gateway settings.
///
/// ```rust
/// # use heimdall::{ModelKind, ModelRef, Settings, Task};
/// # use std::time::Duration;
/// let settings = Settings::default()
///     .model(Task::Parse, ModelRef::new("anthropic", "claude-haiku", ModelKind::Chat))
///     .cache_ttl(Duration::from_secs(60))
///     .enable_safety(false);
/// assert_eq!(settings.per_task[&Task::Parse].provider, "anthropic");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Model per task. Tasks without an entry use a built-in default on
    /// `default_provider`.
    pub per_task: HashMap<Task, ModelRef>,
    pub defaults: Defaults,
    /// Run the safety gate before and after provider calls. Default: on.
    pub enable_safety: bool,
    /// Serve and store cacheable responses. Default: on.
    pub enable_cache: bool,
    /// Lifetime of cached responses. Default: 10 minutes.
    pub cache_ttl: Duration,
    /// Provider for tasks without a configured model. Default: `openai`.
    pub default_provider: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            per_task: HashMap::new(),
            defaults: Defaults::default(),
            enable_safety: true,
            enable_cache: true,
            cache_ttl: Duration::from_secs(600),
            default_provider: "openai".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `task` to `model`.
    pub fn model(mut self, task: Task, model: ModelRef) -> Self {
        self.per_task.insert(task, model);
        self
    }

    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn enable_safety(mut self, enable: bool) -> Self {
        self.enable_safety = enable;
        self
    }

    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }
}

/// Read-only settings collaborator.
pub trait SettingsSource: Send + Sync {
    /// Current settings snapshot.
    fn settings(&self) -> Settings;
}

impl SettingsSource for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

/// Settings that can be replaced while the gateway is running.
///
/// Clones share the same underlying value.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replace the settings; routes started afterwards see the new value.
    pub fn replace(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Modify the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard);
    }
}

impl SettingsSource for SharedSettings {
    fn settings(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_settings_replace_is_visible_to_clones() {
        let shared = SharedSettings::new(Settings::default());
        let reader = shared.clone();
        assert!(reader.settings().enable_cache);

        shared.update(|s| s.enable_cache = false);
        assert!(!reader.settings().enable_cache);

        shared.replace(Settings::default().default_provider("local"));
        assert_eq!(reader.settings().default_provider, "local");
        assert!(reader.settings().enable_cache);
    }

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert!(settings.enable_safety);
        assert!(settings.enable_cache);
        assert_eq!(settings.defaults.retry_attempts, 3);
        assert_eq!(settings.defaults.backoff, Duration::from_millis(500));
        assert_eq!(settings.default_provider, "openai");
    }
}
