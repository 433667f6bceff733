//! Configuration management for dashfeed
//!
//! Settings are layered:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use dashfeed::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Data directory: {}", config.storage.data_dir.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DASHFEED__<section>__<key>`
//!
//! Examples:
//! - `DASHFEED__SCHEDULER__TICK_SECS=5`
//! - `DASHFEED__STORAGE__LOG_MAX_BYTES=512KB`
//! - `DASHFEED__LOCATION__LATITUDE=48.85`
//!
//! Credentials are read only from `WEATHERBIT_API_KEY`, `SOLAR_APP_SECRET`,
//! `SOLAR_EMAIL` and `SOLAR_PASSWORD_HASH`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/dashfeed.toml`.
//! This can be overridden using the `DASHFEED_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, FeedConfig, FeedsConfig, HttpConfig, LocationConfig, MessagingConfig,
    SchedulerConfig, SolarConfig, StorageConfig, UpdateConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
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

    /// Effective configuration as TOML. Secrets are never rendered.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
