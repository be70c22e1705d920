//! Configuration management for the request guard.
//!
//! Settings are layered: serde defaults, then an optional TOML file named by
//! `CONFIG_FILE` (default `config/default.toml`), then environment variables
//! prefixed with `GUARD`, nested with `__` (for example
//! `GUARD__GUARD__RATE_LIMIT__MAX_REQUESTS=10`).

use std::env;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as RawConfig, ConfigError, Environment, File};
use thiserror::Error;

use crate::models::Config;

const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigValidationError),
}

/// A loaded configuration that cannot be run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("at least one allowed origin is required")]
    NoAllowedOrigins,
    #[error("admin api key must not be empty")]
    EmptyAdminKey,
}

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigLoadError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

    let builder = RawConfig::builder()
        .add_source(File::with_name(&config_file).required(false))
        .add_source(
            Environment::with_prefix("GUARD")
                .separator("__")
                .try_parsing(true),
        );

    build_config(builder)
}

fn build_config(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigLoadError> {
    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings that would disable a check outright
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let guard = &self.guard;
        let positive = [
            ("guard.rate_limit.max_requests", guard.rate_limit.max_requests as u64),
            ("guard.rate_limit.window_duration_ms", guard.rate_limit.window_duration_ms),
            ("guard.rate_limit.sweep_interval_ms", guard.rate_limit.sweep_interval_ms),
            ("guard.violations.block_threshold", guard.violations.block_threshold as u64),
            ("guard.violations.block_duration_ms", guard.violations.block_duration_ms),
            ("guard.event_log.capacity", guard.event_log.capacity as u64),
            ("guard.classifier.indicator_threshold", guard.classifier.indicator_threshold as u64),
            ("guard.classifier.suspicious_threshold", guard.classifier.suspicious_threshold as u64),
            ("guard.cleanup_interval_seconds", guard.cleanup_interval_seconds),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigValidationError::Zero(*name));
        }

        if guard.origins.allowed_origins.is_empty() {
            return Err(ConfigValidationError::NoAllowedOrigins);
        }
        if self.admin.api_key.trim().is_empty() {
            return Err(ConfigValidationError::EmptyAdminKey);
        }
        Ok(())
    }
}
