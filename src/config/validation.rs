use super::models::{Config, FeedConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    ZeroValue { field: &'static str },

    #[error("backoff cap ({cap}s) is below the base delay ({base}s)")]
    BackoffCapBelowBase { base: u64, cap: u64 },

    #[error("feed '{feed}' has an invalid url '{url}'")]
    InvalidFeedUrl { feed: &'static str, url: String },

    #[error("latitude {0} is outside -90..=90")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside -180..=180")]
    InvalidLongitude(f64),

    #[error("log cap must hold at least one entry, got {0} bytes")]
    LogCapTooSmall(u64),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_scheduler(config)?;
    validate_storage(config)?;
    validate_feeds(config)?;
    validate_location(config)?;
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    let scheduler = &config.scheduler;
    if scheduler.tick_secs == 0 {
        return Err(ValidationError::ZeroValue {
            field: "scheduler.tick_secs",
        });
    }
    if scheduler.backoff_base_secs == 0 {
        return Err(ValidationError::ZeroValue {
            field: "scheduler.backoff_base_secs",
        });
    }
    if scheduler.backoff_cap_secs < scheduler.backoff_base_secs {
        return Err(ValidationError::BackoffCapBelowBase {
            base: scheduler.backoff_base_secs,
            cap: scheduler.backoff_cap_secs,
        });
    }
    if scheduler.max_fail_count == 0 {
        return Err(ValidationError::ZeroValue {
            field: "scheduler.max_fail_count",
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let storage = &config.storage;
    if storage.log_max_bytes.as_u64() < 1024 {
        return Err(ValidationError::LogCapTooSmall(storage.log_max_bytes.as_u64()));
    }
    if storage.log_queue_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "storage.log_queue_size",
        });
    }
    if config.http.payload_capacity.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "http.payload_capacity",
        });
    }
    Ok(())
}

fn validate_feeds(config: &Config) -> Result<(), ValidationError> {
    let feeds: [(&'static str, &FeedConfig); 3] = [
        ("weather", &config.feeds.weather),
        ("uv", &config.feeds.uv),
        ("air_quality", &config.feeds.air_quality),
    ];
    for (name, feed) in feeds {
        if feed.interval_secs == 0 {
            return Err(ValidationError::ZeroValue {
                field: "feeds.*.interval_secs",
            });
        }
        validate_url(name, &feed.url)?;
    }
    validate_url("solar", &config.solar.base_url)?;
    if !config.update.version_url.is_empty() {
        validate_url("update", &config.update.version_url)?;
    }
    Ok(())
}

fn validate_url(feed: &'static str, url: &str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::InvalidFeedUrl {
            feed,
            url: url.to_string(),
        })
    }
}

fn validate_location(config: &Config) -> Result<(), ValidationError> {
    let location = &config.location;
    if !(-90.0..=90.0).contains(&location.latitude) {
        return Err(ValidationError::InvalidLatitude(location.latitude));
    }
    if !(-180.0..=180.0).contains(&location.longitude) {
        return Err(ValidationError::InvalidLongitude(location.longitude));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_cap_below_base() {
        let mut config = Config::default();
        config.scheduler.backoff_base_secs = 60;
        config.scheduler.backoff_cap_secs = 30;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BackoffCapBelowBase { base: 60, cap: 30 })
        ));
    }

    #[test]
    fn test_invalid_feed_url() {
        let mut config = Config::default();
        config.feeds.weather.url = "ftp://example.com".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidFeedUrl { feed: "weather", .. })
        ));
    }

    #[test]
    fn test_zero_tick() {
        let mut config = Config::default();
        config.scheduler.tick_secs = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroValue { .. })
        ));
    }

    #[test]
    fn test_latitude_out_of_range() {
        let mut config = Config::default();
        config.location.latitude = 91.0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidLatitude(_))
        ));
    }
}
