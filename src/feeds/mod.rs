//! Remote feeds
//!
//! A feed builds its request, reads and decodes the response, and returns a
//! [`FeedUpdate`]. It never writes shared state: the scheduler applies the
//! update to the [`Dashboard`], raises dirty flags and persists the record.

pub mod air_quality;
pub mod solar;
pub mod token;
pub mod uv;
pub mod weather;

pub use air_quality::AirQualityFeed;
pub use solar::{HistoryPeriod, SolarHistoryFeed, SolarRealtimeFeed, SolarReading};
pub use token::SolarTokenFeed;
pub use uv::UvFeed;
pub use weather::WeatherFeed;

use crate::host::LinkStatus;
use crate::state::{
    AirQuality, AuthToken, Dashboard, DirtyGroup, EnergyTotals, Uv, Weather, clock_label,
};
use crate::transport::{HttpRequest, PayloadError, SharedTransport, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Business message the solar API uses for a rejected bearer token
pub const AUTH_INVALID_TOKEN: &str = "auth invalid token";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no network link")]
    Offline,

    #[error("transport busy")]
    Busy,

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("payload read error: {0}")]
    Payload(#[from] PayloadError),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("token rejected")]
    AuthRejected,

    #[error("{0}")]
    Api(String),
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Busy => FetchError::Busy,
            TransportError::Timeout => FetchError::Timeout,
            other => FetchError::Transport(other.to_string()),
        }
    }
}

impl FetchError {
    /// The response arrived but its body could not be used
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, FetchError::Payload(_) | FetchError::Decode(_))
    }
}

/// What one fetch attempt means for the scheduler
#[derive(Debug)]
pub enum FetchOutcome {
    Success(FeedUpdate),
    /// Counts against backoff
    Failed(FetchError),
    /// Nothing was attempted, e.g. no network link; backoff is left alone
    NotApplicable,
    /// The shared token was refused; it is cleared without backoff
    AuthRejected,
}

impl From<Result<FeedUpdate, FetchError>> for FetchOutcome {
    fn from(result: Result<FeedUpdate, FetchError>) -> Self {
        match result {
            Ok(update) => FetchOutcome::Success(update),
            Err(FetchError::Offline) => FetchOutcome::NotApplicable,
            Err(FetchError::AuthRejected) => FetchOutcome::AuthRejected,
            Err(e) => FetchOutcome::Failed(e),
        }
    }
}

/// Which persisted record an applied update touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Weather,
    Uv,
    AirQuality,
    Solar,
    Token,
}

/// Side effects the scheduler must carry out after applying an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub group: Option<DirtyGroup>,
    pub record: Option<RecordKind>,
    pub extremes_changed: bool,
}

impl Applied {
    fn record(group: DirtyGroup, record: RecordKind) -> Self {
        Self {
            group: Some(group),
            record: Some(record),
            extremes_changed: false,
        }
    }
}

/// Decoded result of a fetch, ready to be applied to the dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Weather(Weather),
    Uv(Uv),
    /// UV forced to zero while it is dark outside
    UvDark { update_time: i64, time_string: String },
    AirQuality(AirQuality),
    SolarRealtime(SolarReading),
    SolarHistory {
        period: HistoryPeriod,
        totals: EnergyTotals,
        update_time: i64,
    },
    Token(AuthToken),
}

impl FeedUpdate {
    /// Line for the human-readable trail, `None` for silent updates
    pub fn summary(&self) -> Option<String> {
        match self {
            FeedUpdate::Weather(_) => Some("Weather updated".to_string()),
            FeedUpdate::Uv(uv) => Some(format!("UV updated, index {}", uv.index)),
            FeedUpdate::UvDark { .. } => None,
            FeedUpdate::AirQuality(aq) => Some(format!(
                "Air quality updated. PM10: {:.2}, PM2.5: {:.2}, Ozone: {:.2}, AQI: {}",
                aq.pm10, aq.pm2_5, aq.ozone, aq.european_aqi
            )),
            FeedUpdate::SolarRealtime(_) => Some("Solar status updated".to_string()),
            FeedUpdate::SolarHistory { period, .. } => {
                Some(format!("Solar {} values updated", period.label()))
            }
            FeedUpdate::Token(token) => Some(format!(
                "Solar token obtained, stored length {}",
                token.token.len()
            )),
        }
    }

    pub fn apply(self, dashboard: &mut Dashboard) -> Applied {
        match self {
            FeedUpdate::Weather(weather) => {
                dashboard.weather = weather;
                Applied::record(DirtyGroup::Weather, RecordKind::Weather)
            }
            FeedUpdate::Uv(uv) => {
                dashboard.uv = uv;
                Applied::record(DirtyGroup::Uv, RecordKind::Uv)
            }
            FeedUpdate::UvDark {
                update_time,
                time_string,
            } => {
                let changed = dashboard.uv.index != 0;
                dashboard.uv.index = 0;
                dashboard.uv.update_time = update_time;
                dashboard.uv.time_string = time_string;
                Applied {
                    group: Some(DirtyGroup::Uv),
                    record: changed.then_some(RecordKind::Uv),
                    extremes_changed: false,
                }
            }
            FeedUpdate::AirQuality(air_quality) => {
                dashboard.air_quality = air_quality;
                Applied::record(DirtyGroup::Weather, RecordKind::AirQuality)
            }
            FeedUpdate::SolarRealtime(reading) => {
                let extremes_changed = solar::apply_reading(&mut dashboard.solar, &reading);
                Applied {
                    extremes_changed,
                    ..Applied::record(DirtyGroup::Solar, RecordKind::Solar)
                }
            }
            FeedUpdate::SolarHistory {
                period,
                totals,
                update_time,
            } => {
                match period {
                    HistoryPeriod::Day => {
                        dashboard.solar.today = totals;
                        dashboard.solar.daily_update_time = update_time;
                    }
                    HistoryPeriod::Month => {
                        dashboard.solar.month = totals;
                        dashboard.solar.monthly_update_time = update_time;
                    }
                }
                Applied::record(DirtyGroup::Solar, RecordKind::Solar)
            }
            FeedUpdate::Token(token) => {
                dashboard.token = token;
                Applied {
                    group: None,
                    record: Some(RecordKind::Token),
                    extremes_changed: false,
                }
            }
        }
    }
}

/// Static identity of a feed
#[derive(Debug, Clone)]
pub struct FeedDescriptor {
    pub name: &'static str,
    /// Prefix for trail messages, e.g. "Air quality"
    pub label: &'static str,
    pub interval_secs: i64,
    /// Skipped while the shared solar token is empty
    pub requires_token: bool,
}

/// Everything a fetch may read
pub struct FetchContext<'a> {
    pub transport: &'a SharedTransport,
    pub link: &'a dyn LinkStatus,
    pub now: DateTime<FixedOffset>,
    /// Snapshot taken at the start of the tick
    pub dashboard: &'a Dashboard,
    pub payload_capacity: usize,
}

impl FetchContext<'_> {
    pub fn timestamp(&self) -> i64 {
        self.now.timestamp()
    }

    pub fn clock_label(&self) -> String {
        clock_label(&self.now)
    }

    /// Body of a 200 response, capacity-checked
    pub async fn fetch_body(&self, request: HttpRequest) -> Result<Vec<u8>, FetchError> {
        if !self.link.is_connected() {
            return Err(FetchError::Offline);
        }
        let exchange = self
            .transport
            .exchange(request, self.payload_capacity)
            .await?;
        if exchange.status != 200 {
            return Err(FetchError::Status(exchange.status));
        }
        match exchange.body {
            Ok(body) => Ok(body),
            // A body that stalls or drops is a transport failure, not a bad payload
            Err(PayloadError::Transport(e)) => Err(FetchError::from(e)),
            Err(e) => Err(FetchError::Payload(e)),
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, FetchError> {
        let body = self.fetch_body(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
pub trait Feed: Send + Sync {
    fn descriptor(&self) -> &FeedDescriptor;

    /// When this feed's data was last refreshed, unix seconds
    fn last_update(&self, dashboard: &Dashboard) -> i64;

    /// An update that replaces the network fetch this tick
    fn override_update(&self, _dashboard: &Dashboard, _now: &DateTime<FixedOffset>) -> Option<FeedUpdate> {
        None
    }

    /// Hook run after the body of a response could not be used
    fn on_decode_failure(&self, _dashboard: &mut Dashboard, _now: i64) {}

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError>;
}
