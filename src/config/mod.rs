//! Configuration management for the activity log service
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use activitylog::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Consuming subject: {}", config.stream.subject);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `ACTIVITYLOG__<section>__<key>`
//!
//! Examples:
//! - `ACTIVITYLOG__WORKER__COUNT=8`
//! - `ACTIVITYLOG__STREAM__ACK_WAIT=45s`
//! - `ACTIVITYLOG__CACHE__ITEM_TTL=2h`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/activitylog.toml`.
//! This can be overridden using the `ACTIVITYLOG_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    CacheConfig, Config, ConsumerConfig, LogFormat, LoggingConfig, NotifyConfig, ServerConfig,
    StorageConfig, StreamConfig, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
