//! Solar inverter cloud API: real-time power flows and energy history
//!
//! Every request carries the shared bearer token. A response whose `msg` is
//! [`AUTH_INVALID_TOKEN`] is reported as [`FetchError::AuthRejected`] so the
//! scheduler can drop the token instead of backing off.

use super::{AUTH_INVALID_TOKEN, Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError};
use crate::config::SolarConfig;
use crate::state::{BatteryExtremes, Dashboard, EnergyTotals, Solar, clock_label};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use chrono::{DateTime, Timelike};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Decoded real-time reading; powers already in kW
#[derive(Debug, Clone, PartialEq)]
pub struct SolarReading {
    pub battery_charge: f32,
    pub using_power: f32,
    pub grid_power: f32,
    pub battery_power: f32,
    pub solar_power: f32,
    /// Inverter timestamp as local `HH:MM:SS`
    pub time: String,
    pub update_time: i64,
    /// Local hour at fetch time, drives the midnight reset
    pub local_hour: u32,
}

/// Copy a reading into `solar` and track the day's battery range.
///
/// Returns true when the min/max pair changed and must be persisted.
pub fn apply_reading(solar: &mut Solar, reading: &SolarReading) -> bool {
    solar.current_update_time = reading.update_time;
    solar.battery_charge = reading.battery_charge;
    solar.using_power = reading.using_power;
    solar.grid_power = reading.grid_power;
    solar.battery_power = reading.battery_power;
    solar.solar_power = reading.solar_power;
    solar.time = reading.time.clone();

    let mut changed = false;
    if reading.local_hour == 0 && !solar.minmax_reset {
        solar.extremes = BatteryExtremes::default();
        solar.minmax_reset = true;
        changed = true;
    } else if reading.local_hour != 0 {
        solar.minmax_reset = false;
    }

    let soc = reading.battery_charge;
    if soc < solar.extremes.min && soc != 0.0 {
        solar.extremes.min = soc;
        changed = true;
    }
    if soc > solar.extremes.max {
        solar.extremes.max = soc;
        changed = true;
    }
    changed
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealTimeResponse {
    #[serde(default)]
    battery_soc: f32,
    #[serde(default)]
    use_power: f32,
    #[serde(default)]
    wire_power: f32,
    #[serde(default)]
    battery_power: f32,
    #[serde(default)]
    generation_power: f32,
    #[serde(default)]
    last_update_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    #[serde(default)]
    station_data_items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryItem {
    #[serde(default)]
    buy_value: f32,
    #[serde(default)]
    use_value: f32,
    #[serde(default)]
    generation_value: f32,
}

/// POST to the solar API with the current token and unwrap the success envelope
async fn post_solar<T: DeserializeOwned>(
    ctx: &FetchContext<'_>,
    url: &str,
    body: serde_json::Value,
) -> Result<T, FetchError> {
    let request = HttpRequest::post_json(url, body.to_string())
        .header("Authorization", ctx.dashboard.token.token.as_str());
    let bytes = ctx.fetch_body(request).await?;

    let envelope: Envelope = serde_json::from_slice(&bytes)?;
    if !envelope.success {
        return match envelope.msg.as_deref() {
            Some(AUTH_INVALID_TOKEN) => Err(FetchError::AuthRejected),
            Some(msg) => Err(FetchError::Api(msg.to_string())),
            None => Err(FetchError::Api("no success".to_string())),
        };
    }
    Ok(serde_json::from_slice(&bytes)?)
}

pub struct SolarRealtimeFeed {
    descriptor: FeedDescriptor,
    url: String,
    station_id: String,
}

impl SolarRealtimeFeed {
    pub fn new(config: &SolarConfig) -> Self {
        Self {
            descriptor: FeedDescriptor {
                name: "solar_realtime",
                label: "Solar status",
                interval_secs: config.realtime_interval_secs as i64,
                requires_token: true,
            },
            url: format!("{}/station/v1.0/realTime?language=en", config.base_url),
            station_id: config.station_id.clone(),
        }
    }
}

#[async_trait]
impl Feed for SolarRealtimeFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        dashboard.solar.current_update_time
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let body = json!({ "stationId": self.station_id });
        let response: RealTimeResponse = post_solar(ctx, &self.url, body).await?;

        let time = DateTime::from_timestamp(response.last_update_time, 0)
            .map(|at| clock_label(&at.with_timezone(ctx.now.offset())))
            .unwrap_or_else(|| crate::state::NO_TIME.to_string());

        Ok(FeedUpdate::SolarRealtime(SolarReading {
            battery_charge: response.battery_soc,
            using_power: response.use_power / 1000.0,
            grid_power: response.wire_power / 1000.0,
            battery_power: response.battery_power / 1000.0,
            solar_power: response.generation_power / 1000.0,
            time,
            update_time: ctx.timestamp(),
            local_hour: ctx.now.hour(),
        }))
    }
}

/// Aggregation window of a history request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    Day,
    Month,
}

impl HistoryPeriod {
    fn time_type(self) -> u8 {
        match self {
            HistoryPeriod::Day => 2,
            HistoryPeriod::Month => 3,
        }
    }

    fn date_format(self) -> &'static str {
        match self {
            HistoryPeriod::Day => "%Y-%m-%d",
            HistoryPeriod::Month => "%Y-%m",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HistoryPeriod::Day => "today's",
            HistoryPeriod::Month => "month's",
        }
    }
}

pub struct SolarHistoryFeed {
    descriptor: FeedDescriptor,
    period: HistoryPeriod,
    url: String,
    station_id: String,
}

impl SolarHistoryFeed {
    pub fn new(config: &SolarConfig, period: HistoryPeriod) -> Self {
        let (name, label, interval) = match period {
            HistoryPeriod::Day => ("solar_daily", "Solar today's values", config.daily_interval_secs),
            HistoryPeriod::Month => ("solar_monthly", "Solar month's values", config.monthly_interval_secs),
        };
        Self {
            descriptor: FeedDescriptor {
                name,
                label,
                interval_secs: interval as i64,
                requires_token: true,
            },
            period,
            url: format!("{}/station/v1.0/history?language=en", config.base_url),
            station_id: config.station_id.clone(),
        }
    }
}

#[async_trait]
impl Feed for SolarHistoryFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        match self.period {
            HistoryPeriod::Day => dashboard.solar.daily_update_time,
            HistoryPeriod::Month => dashboard.solar.monthly_update_time,
        }
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let date = ctx.now.format(self.period.date_format()).to_string();
        let body = json!({
            "stationId": self.station_id,
            "timeType": self.period.time_type(),
            "startTime": date,
            "endTime": date,
        });
        let response: HistoryResponse = post_solar(ctx, &self.url, body).await?;
        let item = response
            .station_data_items
            .first()
            .ok_or_else(|| FetchError::Api("no station data items".to_string()))?;

        Ok(FeedUpdate::SolarHistory {
            period: self.period,
            totals: EnergyTotals {
                bought: item.buy_value,
                used: item.use_value,
                generated: item.generation_value,
            },
            update_time: ctx.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::test_support::Harness;
    use crate::transport::scripted::ScriptedReply;

    fn config() -> SolarConfig {
        SolarConfig {
            base_url: "https://solar.test".to_string(),
            station_id: "4242".to_string(),
            ..SolarConfig::default()
        }
    }

    fn reading(soc: f32, hour: u32) -> SolarReading {
        SolarReading {
            battery_charge: soc,
            using_power: 0.5,
            grid_power: 0.0,
            battery_power: 0.1,
            solar_power: 1.2,
            time: "12:00:00".to_string(),
            update_time: 1,
            local_hour: hour,
        }
    }

    #[test]
    fn test_extremes_track_range_and_ignore_zero() {
        let mut solar = Solar::default();
        assert!(apply_reading(&mut solar, &reading(60.0, 9)));
        assert!(apply_reading(&mut solar, &reading(80.0, 10)));
        assert!(!apply_reading(&mut solar, &reading(0.0, 11)));

        assert_eq!(solar.extremes, BatteryExtremes { min: 60.0, max: 80.0 });
        assert_eq!(solar.battery_charge, 0.0);
    }

    #[test]
    fn test_midnight_reset_fires_once() {
        let mut solar = Solar::default();
        apply_reading(&mut solar, &reading(30.0, 22));
        apply_reading(&mut solar, &reading(90.0, 23));

        assert!(apply_reading(&mut solar, &reading(50.0, 0)));
        assert!(solar.minmax_reset);
        assert_eq!(solar.extremes, BatteryExtremes { min: 50.0, max: 50.0 });

        apply_reading(&mut solar, &reading(40.0, 0));
        assert_eq!(solar.extremes, BatteryExtremes { min: 40.0, max: 50.0 });

        apply_reading(&mut solar, &reading(45.0, 1));
        assert!(!solar.minmax_reset);
        assert_eq!(solar.extremes, BatteryExtremes { min: 40.0, max: 50.0 });
    }

    #[tokio::test]
    async fn test_realtime_converts_units_and_sends_token() {
        let mut harness = Harness::new();
        harness.dashboard.token.token = "bearer abc".to_string();
        harness.scripted.push(ScriptedReply::ok_json(
            r#"{"success":true,"batterySoc":71.0,"usePower":850.0,"wirePower":-120.0,
                "batteryPower":300.0,"generationPower":2400.0,"lastUpdateTime":1717245000}"#,
        ));

        let update = SolarRealtimeFeed::new(&config()).fetch(&harness.ctx()).await.unwrap();
        let FeedUpdate::SolarRealtime(reading) = update else {
            panic!("expected realtime update");
        };
        assert_eq!(reading.battery_charge, 71.0);
        assert_eq!(reading.using_power, 0.85);
        assert_eq!(reading.grid_power, -0.12);
        assert_eq!(reading.solar_power, 2.4);
        assert_eq!(reading.time, "12:30:00");
        assert_eq!(reading.local_hour, 12);

        let request = &harness.scripted.requests()[0];
        assert_eq!(request.url, "https://solar.test/station/v1.0/realTime?language=en");
        assert!(request.headers.contains(&("Authorization".to_string(), "bearer abc".to_string())));
        assert_eq!(request.body.as_deref(), Some(r#"{"stationId":"4242"}"#));
    }

    #[tokio::test]
    async fn test_invalid_token_is_auth_rejection() {
        let harness = Harness::new();
        harness
            .scripted
            .push(ScriptedReply::ok_json(r#"{"success":false,"msg":"auth invalid token"}"#));
        harness
            .scripted
            .push(ScriptedReply::ok_json(r#"{"success":false,"msg":"station not found"}"#));

        let feed = SolarRealtimeFeed::new(&config());
        let ctx = harness.ctx();
        assert!(matches!(feed.fetch(&ctx).await, Err(FetchError::AuthRejected)));
        assert!(matches!(feed.fetch(&ctx).await, Err(FetchError::Api(msg)) if msg == "station not found"));
    }

    #[tokio::test]
    async fn test_monthly_history_request() {
        let harness = Harness::new();
        harness.scripted.push(ScriptedReply::ok_json(
            r#"{"success":true,"stationDataItems":[{"buyValue":12.5,"useValue":300.25,"generationValue":410.0}]}"#,
        ));

        let feed = SolarHistoryFeed::new(&config(), HistoryPeriod::Month);
        let update = feed.fetch(&harness.ctx()).await.unwrap();
        assert_eq!(
            update,
            FeedUpdate::SolarHistory {
                period: HistoryPeriod::Month,
                totals: EnergyTotals {
                    bought: 12.5,
                    used: 300.25,
                    generated: 410.0
                },
                update_time: harness.now.timestamp(),
            }
        );

        let body: serde_json::Value =
            serde_json::from_str(harness.scripted.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["timeType"], 3);
        assert_eq!(body["startTime"], "2024-06");
        assert_eq!(body["endTime"], "2024-06");
    }

    #[tokio::test]
    async fn test_history_without_items_fails() {
        let harness = Harness::new();
        harness
            .scripted
            .push(ScriptedReply::ok_json(r#"{"success":true,"stationDataItems":[]}"#));

        let feed = SolarHistoryFeed::new(&config(), HistoryPeriod::Day);
        let err = feed.fetch(&harness.ctx()).await.unwrap_err();
        assert!(matches!(err, FetchError::Api(_)));
    }
}
