//! Configuration management for the dynamic cache.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DYNCACHE__` prefix, `__` separator)
//! - Component-wise validation
mod cache;
mod demo;
mod monitoring;
mod reflector;
mod retry;
pub use cache::*;
pub use demo::*;
pub use monitoring::*;
pub use reflector::*;
pub use retry::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::Result;

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DynamicCacheConfig {
    /// Watch registry and coordinator parameters
    #[serde(default)]
    pub cache: CacheConfig,
    /// List-and-watch parameters shared by every reflector
    #[serde(default)]
    pub reflector: ReflectorConfig,
    /// Metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Demo binary settings
    #[serde(default)]
    pub demo: DemoConfig,
}

impl DynamicCacheConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so callers can still apply
    /// `with_override_config()`. Call `validate()` before use.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.reflector.validate()?;
        self.monitoring.validate()?;
        self.demo.validate()?;
        Ok(self)
    }
}
