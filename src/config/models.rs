use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub solar: SolarConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// Poll loop timing and backoff policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Idle delay between full passes over the feed table
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_max_fail_count")]
    pub max_fail_count: u32,
    /// Age after which the solar token is dropped and re-acquired
    #[serde(default = "default_token_max_age_secs")]
    pub token_max_age_secs: u64,
    #[serde(default = "default_update_check_interval_secs")]
    pub update_check_interval_secs: u64,
    /// 0 disables the software watchdog
    #[serde(default = "default_watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            max_fail_count: default_max_fail_count(),
            token_max_age_secs: default_token_max_age_secs(),
            update_check_interval_secs: default_update_check_interval_secs(),
            watchdog_timeout_secs: default_watchdog_timeout_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    10
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_cap_secs() -> u64 {
    300
}

fn default_max_fail_count() -> u32 {
    32
}

fn default_token_max_age_secs() -> u64 {
    12 * 3600
}

fn default_update_check_interval_secs() -> u64 {
    300
}

fn default_watchdog_timeout_secs() -> u64 {
    120
}

/// Local persistence: state records, rotating logs, prefs keyspace
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// How long a storage operation waits for the storage lock before failing
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: ByteSize,
    #[serde(default = "default_log_queue_size")]
    pub log_queue_size: usize,
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_wait_ms: default_lock_wait_ms(),
            log_max_bytes: default_log_max_bytes(),
            log_queue_size: default_log_queue_size(),
            max_log_entries: default_max_log_entries(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_lock_wait_ms() -> u64 {
    1000
}

fn default_log_max_bytes() -> ByteSize {
    ByteSize::mib(1)
}

fn default_log_queue_size() -> usize {
    64
}

fn default_max_log_entries() -> usize {
    500
}

/// Outbound HTTP transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Largest response body a feed will buffer
    #[serde(default = "default_payload_capacity")]
    pub payload_capacity: ByteSize,
    /// How long a feed waits for the shared transport handle
    #[serde(default = "default_transport_wait_secs")]
    pub transport_wait_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            payload_capacity: default_payload_capacity(),
            transport_wait_secs: default_transport_wait_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("dashfeed/{}", env!("CARGO_PKG_VERSION"))
}

fn default_payload_capacity() -> ByteSize {
    ByteSize::kib(4)
}

fn default_transport_wait_secs() -> u64 {
    10
}

/// Where the dashboard is
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    /// Weatherbit city identifier for the UV feed
    #[serde(default)]
    pub city_id: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            city_id: String::new(),
        }
    }
}

fn default_latitude() -> f64 {
    51.5072
}

fn default_longitude() -> f64 {
    -0.1276
}

/// Polling interval and endpoint for one feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub interval_secs: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedsConfig {
    #[serde(default = "default_weather_feed")]
    pub weather: FeedConfig,
    #[serde(default = "default_uv_feed")]
    pub uv: FeedConfig,
    #[serde(default = "default_air_quality_feed")]
    pub air_quality: FeedConfig,
    /// Weatherbit key, environment only
    #[serde(skip)]
    pub uv_api_key: Option<String>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            weather: default_weather_feed(),
            uv: default_uv_feed(),
            air_quality: default_air_quality_feed(),
            uv_api_key: None,
        }
    }
}

fn default_weather_feed() -> FeedConfig {
    FeedConfig {
        interval_secs: 300,
        url: "https://api.open-meteo.com/v1/forecast".to_string(),
    }
}

fn default_uv_feed() -> FeedConfig {
    FeedConfig {
        interval_secs: 3600,
        url: "https://api.weatherbit.io/v2.0/current".to_string(),
    }
}

fn default_air_quality_feed() -> FeedConfig {
    FeedConfig {
        interval_secs: 1800,
        url: "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
    }
}

/// Solar inverter cloud API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolarConfig {
    #[serde(default = "default_solar_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub station_id: String,
    #[serde(default = "default_solar_realtime_secs")]
    pub realtime_interval_secs: u64,
    #[serde(default = "default_solar_history_secs")]
    pub daily_interval_secs: u64,
    #[serde(default = "default_solar_history_secs")]
    pub monthly_interval_secs: u64,
    /// Account email, environment only
    #[serde(skip)]
    pub email: Option<String>,
    /// Application secret, environment only
    #[serde(skip)]
    pub app_secret: Option<String>,
    /// Hashed account password, environment only
    #[serde(skip)]
    pub password_hash: Option<String>,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            base_url: default_solar_base_url(),
            app_id: String::new(),
            station_id: String::new(),
            realtime_interval_secs: default_solar_realtime_secs(),
            daily_interval_secs: default_solar_history_secs(),
            monthly_interval_secs: default_solar_history_secs(),
            email: None,
            app_secret: None,
            password_hash: None,
        }
    }
}

fn default_solar_base_url() -> String {
    "https://globalapi.solarmanpv.com".to_string()
}

fn default_solar_realtime_secs() -> u64 {
    60
}

fn default_solar_history_secs() -> u64 {
    300
}

/// Firmware version check
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateConfig {
    /// Plain-text version endpoint; empty disables the check
    #[serde(default)]
    pub version_url: String,
    #[serde(default = "default_current_version")]
    pub current_version: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_url: String::new(),
            current_version: default_current_version(),
        }
    }
}

fn default_current_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Message-bus topics for the log trail
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagingConfig {
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            device_id: default_device_id(),
        }
    }
}

impl MessagingConfig {
    pub fn log_topic(&self) -> String {
        format!("{}/{}/log", self.topic_prefix, self.device_id)
    }

    pub fn error_topic(&self) -> String {
        format!("{}/{}/error", self.topic_prefix, self.device_id)
    }
}

fn default_topic_prefix() -> String {
    "dashfeed".to_string()
}

fn default_device_id() -> String {
    "display".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scheduler.tick_secs, 10);
        assert_eq!(config.scheduler.backoff_base_secs, 30);
        assert_eq!(config.scheduler.backoff_cap_secs, 300);
        assert_eq!(config.storage.log_max_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.http.payload_capacity.as_usize(), 4096);
        assert_eq!(config.feeds.uv.interval_secs, 3600);
        assert_eq!(config.solar.realtime_interval_secs, 60);
    }

    #[test]
    fn test_topics() {
        let messaging = MessagingConfig {
            topic_prefix: "home".to_string(),
            device_id: "kitchen".to_string(),
        };
        assert_eq!(messaging.log_topic(), "home/kitchen/log");
        assert_eq!(messaging.error_topic(), "home/kitchen/error");
    }
}
