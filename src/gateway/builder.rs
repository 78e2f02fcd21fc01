//! Builder for configuring gateway instances

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::route::{Gateway, Inner};
use super::single_flight::SingleFlight;
use crate::cache::{CacheConfig, TtlCache};
use crate::config::Config;
use crate::providers::{Provider, RateLimitConfig, RateLimiter};
use crate::safety::{HeuristicPolicy, SafetyPolicy};
use crate::settings::{Settings, SettingsSource};
use crate::{HeimdallError, Result};

/// Main entry point for creating gateway instances.
pub struct Heimdall;

impl Heimdall {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> HeimdallBuilder {
        HeimdallBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// At least one provider must be registered. Everything else has a
/// default: [`Settings::default()`], the [`HeuristicPolicy`] safety gate,
/// [`RateLimitConfig::default()`] and [`CacheConfig::default()`].
pub struct HeimdallBuilder {
    providers: Vec<Arc<dyn Provider>>,
    settings: Option<Arc<dyn SettingsSource>>,
    safety: Option<Arc<dyn SafetyPolicy>>,
    rate_limit: RateLimitConfig,
    cache: CacheConfig,
    #[cfg(feature = "openai")]
    openai_key: Option<String>,
}

impl HeimdallBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            settings: None,
            safety: None,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            #[cfg(feature = "openai")]
            openai_key: None,
        }
    }

    /// Register a provider under its [`Provider::name`].
    ///
    /// A later provider with the same name replaces an earlier one.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Configure the OpenAI provider (registered as `openai`).
    #[cfg(feature = "openai")]
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.openai_key = Some(api_key.into());
        self
    }

    /// Use fixed settings.
    pub fn settings(self, settings: Settings) -> Self {
        self.settings_source(Arc::new(settings))
    }

    /// Read settings from `source` at the start of every route.
    pub fn settings_source(mut self, source: Arc<dyn SettingsSource>) -> Self {
        self.settings = Some(source);
        self
    }

    /// Set the safety policy (default: [`HeuristicPolicy`]).
    pub fn safety(mut self, policy: Arc<dyn SafetyPolicy>) -> Self {
        self.safety = Some(policy);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Apply a loaded configuration file: settings, rate limits and cache size.
    pub fn config(self, config: &Config) -> Result<Self> {
        let settings = config.to_settings()?;
        Ok(self
            .settings(settings)
            .rate_limit(config.rate_limit_config())
            .cache(config.cache.clone()))
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        self.rate_limit.validate()?;

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();

        #[cfg(feature = "openai")]
        if let Some(key) = self.openai_key {
            let client = crate::providers::OpenAiClient::new(key)?;
            providers.insert(client.name().to_string(), Arc::new(client));
        }

        for provider in self.providers {
            providers.insert(provider.name().to_string(), provider);
        }

        // Must have at least one provider
        if providers.is_empty() {
            return Err(HeimdallError::Configuration(
                "at least one provider must be registered".to_string(),
            ));
        }

        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(Settings::default()));
        let safety = self
            .safety
            .unwrap_or_else(|| Arc::new(HeuristicPolicy::new()));

        debug!(
            version = %crate::version_string(),
            providers = providers.len(),
            safety = safety.name(),
            max_entries = self.cache.max_entries,
            "gateway built"
        );

        Ok(Gateway::from_inner(Inner {
            providers,
            settings,
            safety,
            cache: TtlCache::new(&self.cache),
            limiter: RateLimiter::new(self.rate_limit),
            flights: SingleFlight::new(),
            shutdown: CancellationToken::new(),
        }))
    }
}

impl Default for HeimdallBuilder {
    fn default() -> Self {
        Self::new()
    }
}
