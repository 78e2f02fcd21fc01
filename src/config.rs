//! Configuration file loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag, or an explicit path from the embedding app)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. `/etc/heimdall/config.toml` (system)
//!
//! Without any file the built-in defaults apply. Durations are written as
//! integer milliseconds (`*_ms` keys).
//!
//! ```toml
//! [settings]
//! enable_safety = true
//! cache_ttl_ms = 600000
//! default_provider = "openai"
//!
//! [settings.defaults]
//! temperature = 0.2
//! timeout_ms = 30000
//! retry_attempts = 3
//! backoff_ms = 500
//!
//! [settings.per_task.parse]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! cost = { input_per_1k = 0.00015, output_per_1k = 0.0006 }
//!
//! [rate_limit]
//! capacity = 60
//! refill_interval_ms = 1000
//! policy = "wait"
//!
//! [rate_limit.providers.anthropic]
//! capacity = 10
//! refill_interval_ms = 6000
//!
//! [cache]
//! max_entries = 10000
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::providers::{BucketLimits, OverflowPolicy, RateLimitConfig};
use crate::settings::{Defaults, Settings};
use crate::types::{ModelKind, ModelRef, Task, TokenCost};
use crate::{HeimdallError, Result};

/// Gateway configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_true")]
    pub enable_safety: bool,
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Task wire name (`parse`, `coverLetter`, ...) → model.
    #[serde(default)]
    pub per_task: HashMap<String, ModelEntry>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            enable_safety: true,
            enable_cache: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            default_provider: default_provider(),
            defaults: DefaultsConfig::default(),
            per_task: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    600_000
}

fn default_provider() -> String {
    "openai".to_string()
}

/// `[settings.defaults]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

/// One `[settings.per_task.<task>]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub provider: String,
    pub model: String,
    /// Defaults to the kind the task needs.
    #[serde(default)]
    pub kind: Option<ModelKind>,
    #[serde(default)]
    pub cost: Option<TokenCost>,
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
    #[serde(default)]
    pub policy: OverflowPolicy,
    #[serde(default)]
    pub providers: HashMap<String, BucketEntry>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_ms: default_refill_interval_ms(),
            policy: OverflowPolicy::default(),
            providers: HashMap::new(),
        }
    }
}

fn default_capacity() -> u32 {
    60
}

fn default_refill_interval_ms() -> u64 {
    1_000
}

/// One `[rate_limit.providers.<id>]` override.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntry {
    pub capacity: u32,
    pub refill_interval_ms: u64,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.heimdall/config.toml`
    /// 3. `/etc/heimdall/config.toml`
    ///
    /// Falls back to [`Config::default`] when no explicit path is given and
    /// neither standard file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            debug!("no config file found, using defaults");
            return Ok(Self::default());
        };
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(&path).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| HeimdallError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot: task names and rate limits.
    pub fn validate(&self) -> Result<()> {
        for task in self.settings.per_task.keys() {
            task.parse::<Task>()
                .map_err(|e| HeimdallError::Configuration(e.to_string()))?;
        }
        self.rate_limit_config().validate()
    }

    /// Runtime settings described by the `[settings]` section.
    pub fn to_settings(&self) -> Result<Settings> {
        let section = &self.settings;
        let mut per_task = HashMap::with_capacity(section.per_task.len());
        for (name, entry) in &section.per_task {
            let task: Task = name
                .parse()
                .map_err(|e: HeimdallError| HeimdallError::Configuration(e.to_string()))?;
            let mut model = ModelRef::new(
                &entry.provider,
                &entry.model,
                entry.kind.unwrap_or_else(|| task.model_kind()),
            );
            model.cost = entry.cost;
            per_task.insert(task, model);
        }

        let defaults = &section.defaults;
        Ok(Settings {
            per_task,
            defaults: Defaults {
                temperature: defaults.temperature,
                max_tokens: defaults.max_tokens,
                timeout: Duration::from_millis(defaults.timeout_ms),
                retry_attempts: defaults.retry_attempts,
                backoff: Duration::from_millis(defaults.backoff_ms),
            },
            enable_safety: section.enable_safety,
            enable_cache: section.enable_cache,
            cache_ttl: Duration::from_millis(section.cache_ttl_ms),
            default_provider: section.default_provider.clone(),
        })
    }

    /// Rate limiter configuration described by the `[rate_limit]` section.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let section = &self.rate_limit;
        RateLimitConfig {
            default_limits: BucketLimits {
                capacity: section.capacity,
                refill_interval: Duration::from_millis(section.refill_interval_ms),
            },
            providers: section
                .providers
                .iter()
                .map(|(name, entry)| {
                    let limits = BucketLimits {
                        capacity: entry.capacity,
                        refill_interval: Duration::from_millis(entry.refill_interval_ms),
                    };
                    (name.clone(), limits)
                })
                .collect(),
            policy: section.policy,
        }
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/heimdall/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        let settings = config.to_settings().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.rate_limit_config().default_limits, BucketLimits::default());
        assert_eq!(config.rate_limit_config().policy, OverflowPolicy::Wait);
    }

    #[test]
    fn model_kind_follows_task() {
        let config = Config::from_toml_str(
            r#"
            [settings.per_task.embed]
            provider = "local"
            model = "all-minilm"
        "#,
        )
        .unwrap();
        let settings = config.to_settings().unwrap();
        assert_eq!(settings.per_task[&Task::Embed].kind, ModelKind::Embed);
    }

    #[test]
    fn rejects_unknown_task() {
        let err = Config::from_toml_str(
            r#"
            [settings.per_task.summarize]
            provider = "openai"
            model = "gpt-4o-mini"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, HeimdallError::Configuration(_)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = Config::from_toml_str("[rate_limit]\ncapacity = 0").unwrap_err();
        assert!(matches!(err, HeimdallError::Configuration(_)));
    }
}
