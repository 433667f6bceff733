//! Current conditions and today's range from the open-meteo forecast API

use super::{Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError};
use crate::config::{FeedConfig, LocationConfig};
use crate::state::{Dashboard, Weather};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use serde::Deserialize;

const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// 8-point compass label for a bearing in degrees
pub fn degrees_to_direction(degrees: f64) -> &'static str {
    let mut bearing = degrees % 360.0;
    if bearing < 0.0 {
        bearing += 360.0;
    }
    bearing += 22.5;
    if bearing >= 360.0 {
        bearing -= 360.0;
    }
    let sector = (bearing / 45.0) as usize;
    COMPASS[sector.min(COMPASS.len() - 1)]
}

/// Text for a WMO weather interpretation code
pub fn wmo_to_text(code: i32, is_day: bool) -> &'static str {
    match code {
        0 if is_day => "Sunny",
        0 => "Clear",
        1 if is_day => "Mainly sunny",
        1 => "Mostly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown weather code",
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Current,
    daily: Daily,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f32,
    is_day: u8,
    weather_code: i32,
    wind_speed_10m: f32,
    wind_direction_10m: f64,
}

#[derive(Debug, Deserialize)]
struct Daily {
    temperature_2m_max: Vec<f32>,
    temperature_2m_min: Vec<f32>,
}

pub struct WeatherFeed {
    descriptor: FeedDescriptor,
    url: String,
}

impl WeatherFeed {
    pub fn new(feed: &FeedConfig, location: &LocationConfig) -> Self {
        let url = format!(
            "{}?latitude={}&longitude={}\
             &daily=temperature_2m_max,temperature_2m_min\
             &current=temperature_2m,is_day,weather_code,wind_speed_10m,wind_direction_10m\
             &timezone=auto&forecast_days=1",
            feed.url, location.latitude, location.longitude
        );
        Self {
            descriptor: FeedDescriptor {
                name: "weather",
                label: "Weather",
                interval_secs: feed.interval_secs as i64,
                requires_token: false,
            },
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Feed for WeatherFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        dashboard.weather.update_time
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let response: ForecastResponse = ctx.fetch_json(HttpRequest::get(&self.url)).await?;
        let (Some(&max_temp), Some(&min_temp)) = (
            response.daily.temperature_2m_max.first(),
            response.daily.temperature_2m_min.first(),
        ) else {
            return Err(FetchError::Api("forecast has no daily range".to_string()));
        };

        let current = response.current;
        let is_day = current.is_day != 0;
        Ok(FeedUpdate::Weather(Weather {
            temperature: current.temperature_2m,
            wind_speed: current.wind_speed_10m,
            max_temp,
            min_temp,
            is_day,
            update_time: ctx.timestamp(),
            wind_dir: degrees_to_direction(current.wind_direction_10m).to_string(),
            description: wmo_to_text(current.weather_code, is_day).to_string(),
            time_string: ctx.clock_label(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::test_support::Harness;
    use crate::transport::scripted::ScriptedReply;

    const FORECAST: &str = r#"{
        "current": {"temperature_2m": 18.4, "is_day": 1, "weather_code": 2,
                    "wind_speed_10m": 11.2, "wind_direction_10m": 230},
        "daily": {"temperature_2m_max": [21.0], "temperature_2m_min": [9.5]}
    }"#;

    fn feed() -> WeatherFeed {
        WeatherFeed::new(
            &FeedConfig {
                interval_secs: 300,
                url: "https://weather.test/v1/forecast".to_string(),
            },
            &LocationConfig::default(),
        )
    }

    #[test]
    fn test_degrees_to_direction() {
        assert_eq!(degrees_to_direction(0.0), "N");
        assert_eq!(degrees_to_direction(22.4), "N");
        assert_eq!(degrees_to_direction(22.5), "NE");
        assert_eq!(degrees_to_direction(180.0), "S");
        assert_eq!(degrees_to_direction(350.0), "N");
        assert_eq!(degrees_to_direction(-90.0), "W");
        assert_eq!(degrees_to_direction(405.0), "NE");
    }

    #[test]
    fn test_wmo_day_and_night_wording() {
        assert_eq!(wmo_to_text(0, true), "Sunny");
        assert_eq!(wmo_to_text(0, false), "Clear");
        assert_eq!(wmo_to_text(1, false), "Mostly clear");
        assert_eq!(wmo_to_text(65, true), "Heavy rain");
        assert_eq!(wmo_to_text(42, true), "Unknown weather code");
    }

    #[test]
    fn test_url_carries_location() {
        let url = feed().url().to_string();
        assert!(url.starts_with("https://weather.test/v1/forecast?latitude=51.5072&longitude=-0.1276"));
        assert!(url.ends_with("&timezone=auto&forecast_days=1"));
    }

    #[tokio::test]
    async fn test_fetch_decodes_forecast() {
        let harness = Harness::new();
        harness.scripted.push(ScriptedReply::ok_json(FORECAST));

        let update = feed().fetch(&harness.ctx()).await.unwrap();
        let FeedUpdate::Weather(weather) = update else {
            panic!("expected weather update");
        };
        assert_eq!(weather.temperature, 18.4);
        assert_eq!(weather.max_temp, 21.0);
        assert_eq!(weather.min_temp, 9.5);
        assert!(weather.is_day);
        assert_eq!(weather.wind_dir, "SW");
        assert_eq!(weather.description, "Partly cloudy");
        assert_eq!(weather.time_string, "12:30:00");
        assert_eq!(weather.update_time, harness.now.timestamp());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_decode_failure() {
        let harness = Harness::new();
        harness
            .scripted
            .push(ScriptedReply::ok_json(FORECAST.replace("18.4", "\"warm\"")));

        let err = feed().fetch(&harness.ctx()).await.unwrap_err();
        assert!(err.is_decode_failure());
    }
}
