//! Host collaborators the poller depends on: wall clock, link status,
//! liveness watchdog and the restart trigger

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::error;

pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Settable clock for tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock in UTC at the given unix time
    pub fn at_timestamp(secs: i64) -> Self {
        let start = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_default()
            .fixed_offset();
        Self::new(start)
    }

    pub fn set(&self, to: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or_default();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub trait LinkStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Link state flipped by whoever manages connectivity
#[derive(Debug, Clone)]
pub struct LinkFlag(Arc<AtomicBool>);

impl LinkFlag {
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}

impl LinkStatus for LinkFlag {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Watchdog: Send + Sync {
    fn reset(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    fn reset(&self) {}
}

/// Aborts the process when not reset within `timeout`
///
/// The supervisor (systemd, a container runtime) is expected to restart it.
#[derive(Debug, Clone)]
pub struct SoftWatchdog {
    last_reset: Arc<AtomicI64>,
    started: std::time::Instant,
}

impl SoftWatchdog {
    pub fn spawn(timeout: Duration) -> Self {
        let watchdog = Self {
            last_reset: Arc::new(AtomicI64::new(0)),
            started: std::time::Instant::now(),
        };
        let monitor = watchdog.clone();
        tokio::spawn(async move {
            let period = (timeout / 4).max(Duration::from_millis(100));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let silent_for = monitor.elapsed_ms() - monitor.last_reset.load(Ordering::Acquire);
                if silent_for > timeout.as_millis() as i64 {
                    error!(silent_ms = silent_for, "Watchdog expired, aborting");
                    std::process::abort();
                }
            }
        });
        watchdog
    }

    fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

impl Watchdog for SoftWatchdog {
    fn reset(&self) {
        self.last_reset.store(self.elapsed_ms(), Ordering::Release);
    }
}

/// The "update and restart" entry point, a single call with no arguments
pub trait UpdateTrigger: Send + Sync {
    fn trigger(&self);
}

impl<F> UpdateTrigger for F
where
    F: Fn() + Send + Sync,
{
    fn trigger(&self) {
        self()
    }
}

/// Restart trigger that signals the process loop through a watch channel
#[derive(Debug, Clone)]
pub struct RestartSignal(watch::Sender<bool>);

impl RestartSignal {
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), rx)
    }
}

impl UpdateTrigger for RestartSignal {
    fn trigger(&self) {
        self.0.send_replace(true);
    }
}
