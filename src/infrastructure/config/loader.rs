//! Configuration loader with hierarchical merging.
//!
//! Precedence (lowest to highest): programmatic defaults, a YAML file,
//! `COHORT_`-prefixed environment variables (`__` separates nesting).

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::scheduler::PoolConfig;

/// Validation errors for the runtime settings.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("pool.workers must be between 1 and 100, got {0}")]
    InvalidWorkers(usize),

    #[error("pool.queue_capacity must be at least 1")]
    EmptyQueue,

    #[error("clock_tick_secs must be at least 1")]
    ZeroTick,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingSettings {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Process-level settings of the core system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoreConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    /// Interval between background full cache reloads
    #[serde(default = "default_cache_refresh_secs")]
    pub cache_refresh_secs: u64,

    /// Clock ticker period; clocks are minute-granular
    #[serde(default = "default_clock_tick_secs")]
    pub clock_tick_secs: u64,

    /// Capacity of the window-dedup map
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Deadline for semantic dedup calls
    #[serde(default = "default_semantic_timeout_secs")]
    pub semantic_timeout_secs: u64,

    #[serde(default)]
    pub logging: LoggingSettings,
}

const fn default_cache_refresh_secs() -> u64 {
    3600
}

const fn default_clock_tick_secs() -> u64 {
    60
}

const fn default_dedup_capacity() -> usize {
    4096
}

const fn default_semantic_timeout_secs() -> u64 {
    10
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            cache_refresh_secs: default_cache_refresh_secs(),
            clock_tick_secs: default_clock_tick_secs(),
            dedup_capacity: default_dedup_capacity(),
            semantic_timeout_secs: default_semantic_timeout_secs(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Loader with defaults → file → environment precedence.
pub struct CoreConfigLoader;

impl CoreConfigLoader {
    /// Load from the default locations.
    pub fn load() -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(".cohort/config.yaml"))
            .merge(Env::prefixed("COHORT_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from an explicit file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate loaded settings.
    pub fn validate(config: &CoreConfig) -> Result<(), ConfigLoadError> {
        if config.pool.workers == 0 || config.pool.workers > 100 {
            return Err(ConfigLoadError::InvalidWorkers(config.pool.workers));
        }
        if config.pool.queue_capacity == 0 {
            return Err(ConfigLoadError::EmptyQueue);
        }
        if config.clock_tick_secs == 0 {
            return Err(ConfigLoadError::ZeroTick);
        }
        if !matches!(
            config.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigLoadError::InvalidLogLevel(config.logging.level.clone()));
        }
        Ok(())
    }
}
