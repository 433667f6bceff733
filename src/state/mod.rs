//! In-memory feed state read by the rendering layer
//!
//! The scheduler is the only writer. Fetchers never touch these structs
//! directly; they return a `FeedUpdate` that the scheduler applies under the
//! write lock, then raises the matching [`DirtyGroup`] flag.

pub mod records;

use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Placeholder shown until a feed has been fetched once
pub const NO_TIME: &str = "--:--:--";

/// Local wall-clock label used for every "updated at" field
pub fn clock_label(now: &DateTime<FixedOffset>) -> String {
    now.format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Weather {
    pub temperature: f32,
    pub wind_speed: f32,
    pub max_temp: f32,
    pub min_temp: f32,
    pub is_day: bool,
    pub update_time: i64,
    pub wind_dir: String,
    pub description: String,
    pub time_string: String,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            wind_speed: 0.0,
            max_temp: 0.0,
            min_temp: 0.0,
            is_day: false,
            update_time: 0,
            wind_dir: String::new(),
            description: String::new(),
            time_string: NO_TIME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Uv {
    pub index: i32,
    pub update_time: i64,
    pub time_string: String,
}

impl Default for Uv {
    fn default() -> Self {
        Self {
            index: 0,
            update_time: 0,
            time_string: NO_TIME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirQuality {
    pub pm10: f32,
    pub pm2_5: f32,
    pub ozone: f32,
    pub european_aqi: i32,
    pub update_time: i64,
    pub time_string: String,
}

impl Default for AirQuality {
    fn default() -> Self {
        Self {
            pm10: 0.0,
            pm2_5: 0.0,
            ozone: 0.0,
            european_aqi: 0,
            update_time: 0,
            time_string: NO_TIME.to_string(),
        }
    }
}

/// Energy counters for one history period, in kWh
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyTotals {
    pub bought: f32,
    pub used: f32,
    pub generated: f32,
}

/// Same-day battery state-of-charge range, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryExtremes {
    pub min: f32,
    pub max: f32,
}

impl Default for BatteryExtremes {
    fn default() -> Self {
        Self { min: 100.0, max: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solar {
    pub current_update_time: i64,
    pub daily_update_time: i64,
    pub monthly_update_time: i64,
    pub battery_charge: f32,
    /// Powers are in kW
    pub using_power: f32,
    pub grid_power: f32,
    pub battery_power: f32,
    pub solar_power: f32,
    /// Inverter-reported reading time
    pub time: String,
    /// Set once the midnight reset of `extremes` has happened today
    pub minmax_reset: bool,
    pub today: EnergyTotals,
    pub month: EnergyTotals,
    /// Persisted in the prefs store, not in the solar record
    pub extremes: BatteryExtremes,
}

impl Default for Solar {
    fn default() -> Self {
        Self {
            current_update_time: 0,
            daily_update_time: 0,
            monthly_update_time: 0,
            battery_charge: 0.0,
            using_power: 0.0,
            grid_power: 0.0,
            battery_power: 0.0,
            solar_power: 0.0,
            time: NO_TIME.to_string(),
            minmax_reset: false,
            today: EnergyTotals::default(),
            month: EnergyTotals::default(),
            extremes: BatteryExtremes::default(),
        }
    }
}

/// Bearer credential for the solar API
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthToken {
    /// Full header value, `"bearer <token>"`, or empty
    pub token: String,
    pub acquired_at: i64,
}

impl AuthToken {
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// Older than `max_age_secs`. A token with no acquisition time never expires.
    pub fn is_expired(&self, now: i64, max_age_secs: i64) -> bool {
        self.acquired_at > 0 && now - self.acquired_at > max_age_secs
    }

    pub fn clear(&mut self) {
        self.token.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    pub weather: Weather,
    pub uv: Uv,
    pub air_quality: AirQuality,
    pub solar: Solar,
    pub token: AuthToken,
}

pub type SharedDashboard = Arc<RwLock<Dashboard>>;

/// Display groups redrawn independently by the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyGroup {
    Weather,
    Uv,
    Solar,
}

/// Set by the scheduler, cleared by the renderer after a redraw
#[derive(Debug, Default)]
pub struct DirtyFlags {
    weather: AtomicBool,
    uv: AtomicBool,
    solar: AtomicBool,
}

impl DirtyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, group: DirtyGroup) -> &AtomicBool {
        match group {
            DirtyGroup::Weather => &self.weather,
            DirtyGroup::Uv => &self.uv,
            DirtyGroup::Solar => &self.solar,
        }
    }

    pub fn mark(&self, group: DirtyGroup) {
        self.flag(group).store(true, Ordering::Release);
    }

    pub fn is_dirty(&self, group: DirtyGroup) -> bool {
        self.flag(group).load(Ordering::Acquire)
    }

    /// Read and clear in one step
    pub fn take(&self, group: DirtyGroup) -> bool {
        self.flag(group).swap(false, Ordering::AcqRel)
    }
}
