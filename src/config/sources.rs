use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DASHFEED_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/dashfeed.toml";
const ENV_PREFIX: &str = "DASHFEED";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Secrets are never read from TOML, only from the environment
pub(super) fn load_secrets(config: &mut Config) {
    if let Ok(key) = env::var("WEATHERBIT_API_KEY") {
        config.feeds.uv_api_key = Some(key);
    }
    if let Ok(secret) = env::var("SOLAR_APP_SECRET") {
        config.solar.app_secret = Some(secret);
    }
    if let Ok(email) = env::var("SOLAR_EMAIL") {
        config.solar.email = Some(email);
    }
    if let Ok(hash) = env::var("SOLAR_PASSWORD_HASH") {
        config.solar.password_hash = Some(hash);
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // DASHFEED__SCHEDULER__TICK_SECS -> scheduler.tick_secs
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let mut config: Config = builder.build()?.try_deserialize()?;
    load_secrets(&mut config);
    Ok(config)
}
