//! Poll loop behaviour against a scripted transport
//!
//! Each test wires a real `PollScheduler` with a manual clock, a toggleable
//! link flag and file-backed stores in a temp dir, then drives it tick by tick.

use dashfeed::config::{FeedConfig, LocationConfig, SolarConfig};
use dashfeed::feeds::{Feed, SolarRealtimeFeed, SolarTokenFeed, UvFeed, WeatherFeed};
use dashfeed::host::{LinkFlag, ManualClock, Watchdog};
use dashfeed::messaging::RecordingPublisher;
use dashfeed::observability::Metrics;
use dashfeed::prefs::PrefsStore;
use dashfeed::queue::{LogEntry, LogQueue};
use dashfeed::report::Reporter;
use dashfeed::scheduler::{BackoffState, PollScheduler, SlotResult, UpdateCheck, UpdateOutcome};
use dashfeed::state::{AuthToken, BatteryExtremes, Dashboard, DirtyFlags, DirtyGroup, SharedDashboard};
use dashfeed::storage::{StateStore, StorageLock};
use dashfeed::transport::SharedTransport;
use dashfeed::transport::scripted::{ScriptedReply, ScriptedTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{RwLock, mpsc};

const T0: i64 = 1_700_000_000;

const FORECAST: &str = r#"{
    "current": {"temperature_2m": 11.0, "is_day": 1, "weather_code": 3,
                "wind_speed_10m": 4.0, "wind_direction_10m": 90},
    "daily": {"temperature_2m_max": [13.0], "temperature_2m_min": [6.0]}
}"#;

const REALTIME: &str = r#"{"success":true,"batterySoc":55.0,"usePower":400.0,"wirePower":0.0,
    "batteryPower":-200.0,"generationPower":600.0,"lastUpdateTime":1700000000}"#;

/// Shared test wiring
struct Rig {
    dir: TempDir,
    scripted: ScriptedTransport,
    link: LinkFlag,
    clock: ManualClock,
    metrics: Arc<Metrics>,
    publisher: Arc<RecordingPublisher>,
    dashboard: SharedDashboard,
    dirty: Arc<DirtyFlags>,
    reporter: Reporter,
    _log_rx: mpsc::Receiver<LogEntry>,
}

impl Rig {
    fn new(dashboard: Dashboard) -> Self {
        let metrics = Arc::new(Metrics::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let clock = ManualClock::at_timestamp(T0);
        let (queue, log_rx) = LogQueue::bounded(256, metrics.clone());
        let reporter = Reporter::new(
            queue,
            publisher.clone(),
            Arc::new(clock.clone()),
            "test/display/log".to_string(),
            "test/display/error".to_string(),
        );

        Self {
            dir: TempDir::new().unwrap(),
            scripted: ScriptedTransport::new(),
            link: LinkFlag::new(true),
            clock,
            metrics,
            publisher,
            dashboard: Arc::new(RwLock::new(dashboard)),
            dirty: Arc::new(DirtyFlags::new()),
            reporter,
            _log_rx: log_rx,
        }
    }

    fn state_store(&self) -> StateStore {
        StateStore::new(self.dir.path(), StorageLock::new(Duration::from_secs(1)))
    }

    fn scheduler(
        &self,
        feeds: Vec<Arc<dyn Feed>>,
        token_feed: Option<Arc<dyn Feed>>,
        prefs: Option<PrefsStore>,
        update_check: Option<UpdateCheck>,
    ) -> PollScheduler {
        PollScheduler::builder()
            .dashboard(self.dashboard.clone())
            .dirty(self.dirty.clone())
            .feeds(feeds)
            .maybe_token_feed(token_feed)
            .maybe_update_check(update_check)
            .transport(SharedTransport::new(self.scripted.clone(), Duration::from_secs(1)))
            .link(Arc::new(self.link.clone()))
            .clock(Arc::new(self.clock.clone()))
            .state_store(self.state_store())
            .maybe_prefs(prefs)
            .reporter(self.reporter.clone())
            .metrics(self.metrics.clone())
            .build()
    }

    fn watched_scheduler(&self, feeds: Vec<Arc<dyn Feed>>, watchdog: Arc<dyn Watchdog>) -> PollScheduler {
        PollScheduler::builder()
            .dashboard(self.dashboard.clone())
            .dirty(self.dirty.clone())
            .feeds(feeds)
            .transport(SharedTransport::new(self.scripted.clone(), Duration::from_secs(1)))
            .link(Arc::new(self.link.clone()))
            .clock(Arc::new(self.clock.clone()))
            .watchdog(watchdog)
            .state_store(self.state_store())
            .reporter(self.reporter.clone())
            .metrics(self.metrics.clone())
            .build()
    }

    fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    fn error_messages(&self) -> Vec<String> {
        self.publisher
            .published()
            .into_iter()
            .filter(|p| p.retained)
            .map(|p| p.payload)
            .collect()
    }
}

fn weather_feed() -> Arc<dyn Feed> {
    Arc::new(WeatherFeed::new(
        &FeedConfig {
            interval_secs: 300,
            url: "https://weather.test/v1/forecast".to_string(),
        },
        &LocationConfig::default(),
    ))
}

fn uv_feed() -> Arc<dyn Feed> {
    Arc::new(UvFeed::new(
        &FeedConfig {
            interval_secs: 3600,
            url: "https://uv.test/current".to_string(),
        },
        &LocationConfig::default(),
        Some("key"),
    ))
}

#[derive(Default)]
struct CountingWatchdog(AtomicUsize);

impl Watchdog for CountingWatchdog {
    fn reset(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn solar_config() -> SolarConfig {
    SolarConfig {
        base_url: "https://solar.test".to_string(),
        app_id: "app".to_string(),
        station_id: "77".to_string(),
        app_secret: Some("secret".to_string()),
        email: Some("owner@example.com".to_string()),
        password_hash: Some("hash".to_string()),
        ..SolarConfig::default()
    }
}

fn token_feed() -> Option<Arc<dyn Feed>> {
    SolarTokenFeed::new(&solar_config()).map(|feed| Arc::new(feed) as Arc<dyn Feed>)
}

#[tokio::test]
async fn test_backoff_resets_after_three_failures_then_success() {
    let rig = Rig::new(Dashboard::default());
    let mut scheduler = rig.scheduler(vec![weather_feed()], None, None, None);

    rig.scripted.push(ScriptedReply::status(500));
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::Failed));
    assert_eq!(
        scheduler.backoff("weather"),
        Some(BackoffState {
            fail_count: 1,
            next_retry_time: T0 + 30
        })
    );

    rig.advance(30);
    rig.scripted.push(ScriptedReply::status(503));
    scheduler.tick().await;
    assert_eq!(scheduler.backoff("weather").unwrap().next_retry_time, T0 + 90);

    rig.advance(60);
    rig.scripted.push(ScriptedReply::timeout());
    scheduler.tick().await;
    let backoff = scheduler.backoff("weather").unwrap();
    assert_eq!(backoff.fail_count, 3);
    assert_eq!(backoff.next_retry_time, T0 + 210);

    // Still backing off: no request goes out
    rig.advance(10);
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::NotDue));
    assert_eq!(rig.scripted.request_count(), 3);

    rig.advance(110);
    rig.scripted.push(ScriptedReply::ok_json(FORECAST));
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::Succeeded));
    assert_eq!(scheduler.backoff("weather"), Some(BackoffState::default()));

    let dashboard = rig.dashboard.read().await;
    assert_eq!(dashboard.weather.description, "Overcast");
    assert_eq!(dashboard.weather.update_time, T0 + 210);
    assert!(rig.dirty.is_dirty(DirtyGroup::Weather));
    assert!(rig.dir.path().join("weather_data.bin").exists());

    let snapshot = rig.metrics.snapshot();
    assert_eq!(snapshot.fetches_failed, 3);
    assert_eq!(snapshot.fetches_succeeded, 1);
    assert!(
        rig.error_messages()
            .contains(&"[HTTP] Weather request failed, error code is 500".to_string())
    );
}

#[tokio::test]
async fn test_fresh_feed_is_not_fetched() {
    let mut dashboard = Dashboard::default();
    dashboard.weather.update_time = T0 - 100;
    let rig = Rig::new(dashboard);
    let mut scheduler = rig.scheduler(vec![weather_feed()], None, None, None);

    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::NotDue));
    assert_eq!(rig.scripted.request_count(), 0);
}

#[tokio::test]
async fn test_token_gated_feed_skipped_without_backoff() {
    let rig = Rig::new(Dashboard::default());
    let feed: Arc<dyn Feed> = Arc::new(SolarRealtimeFeed::new(&solar_config()));
    let mut scheduler = rig.scheduler(vec![feed], None, None, None);

    for _ in 0..3 {
        let report = scheduler.tick().await;
        assert_eq!(report.token, None);
        assert_eq!(report.result("solar_realtime"), Some(SlotResult::Gated));
        rig.advance(60);
    }
    assert_eq!(rig.scripted.request_count(), 0);
    assert_eq!(scheduler.backoff("solar_realtime"), Some(BackoffState::default()));
}

#[tokio::test]
async fn test_no_link_pauses_backoff() {
    let rig = Rig::new(Dashboard::default());
    let mut scheduler = rig.scheduler(vec![weather_feed()], None, None, None);

    rig.scripted.push(ScriptedReply::status(500));
    scheduler.tick().await;
    let after_failure = scheduler.backoff("weather").unwrap();

    rig.advance(300);
    rig.link.set(false);
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::Skipped));
    assert_eq!(scheduler.backoff("weather"), Some(after_failure));
    assert_eq!(rig.scripted.request_count(), 1);
    assert_eq!(rig.metrics.snapshot().fetches_skipped, 1);
}

#[tokio::test]
async fn test_payload_overflow_counts_as_failure() {
    let rig = Rig::new(Dashboard::default());
    let mut scheduler = rig.scheduler(vec![weather_feed()], None, None, None);

    rig.scripted.push(ScriptedReply::ok_json("x".repeat(5000)));
    let report = scheduler.tick().await;

    assert_eq!(report.result("weather"), Some(SlotResult::Failed));
    assert_eq!(scheduler.backoff("weather").unwrap().fail_count, 1);
    assert_eq!(rig.dashboard.read().await.weather, Default::default());
}

#[tokio::test]
async fn test_auth_rejection_clears_token_and_reacquires() {
    let mut dashboard = Dashboard::default();
    dashboard.token.token = "bearer stale".to_string();
    dashboard.token.acquired_at = T0 - 10;
    let rig = Rig::new(dashboard);
    let feed: Arc<dyn Feed> = Arc::new(SolarRealtimeFeed::new(&solar_config()));
    let mut scheduler = rig.scheduler(vec![feed], token_feed(), None, None);

    rig.scripted
        .push(ScriptedReply::ok_json(r#"{"success":false,"msg":"auth invalid token"}"#));
    let report = scheduler.tick().await;
    assert_eq!(report.token, None);
    assert_eq!(report.result("solar_realtime"), Some(SlotResult::AuthRejected));
    assert!(rig.dashboard.read().await.token.is_empty());
    assert_eq!(scheduler.backoff("solar_realtime"), Some(BackoffState::default()));

    rig.advance(10);
    rig.scripted
        .push(ScriptedReply::ok_json(r#"{"access_token":"fresh","expires_in":"5183999"}"#));
    rig.scripted.push(ScriptedReply::ok_json(REALTIME));
    let report = scheduler.tick().await;
    assert_eq!(report.token, Some(SlotResult::Succeeded));
    assert_eq!(report.result("solar_realtime"), Some(SlotResult::Succeeded));

    let requests = rig.scripted.requests();
    let auth = requests[2]
        .headers
        .iter()
        .find(|(name, _)| name == "Authorization")
        .map(|(_, value)| value.clone());
    assert_eq!(auth.as_deref(), Some("bearer fresh"));

    let dashboard = rig.dashboard.read().await;
    assert_eq!(dashboard.token.acquired_at, T0 + 10);
    assert_eq!(dashboard.solar.battery_charge, 55.0);
    assert_eq!(rig.metrics.snapshot().auth_rejections, 1);
    assert!(rig.dir.path().join("solar_token.bin").exists());
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let mut dashboard = Dashboard::default();
    dashboard.token.token = "bearer old".to_string();
    dashboard.token.acquired_at = T0 - 43_201;
    let rig = Rig::new(dashboard);
    let mut scheduler = rig.scheduler(Vec::new(), token_feed(), None, None);

    rig.scripted.push(ScriptedReply::status(502));
    let report = scheduler.tick().await;
    assert_eq!(report.token, Some(SlotResult::Failed));
    assert!(rig.dashboard.read().await.token.is_empty());

    // Token acquisition has no backoff: the very next tick retries
    rig.scripted.push(ScriptedReply::ok_json(r#"{"access_token":"new"}"#));
    let report = scheduler.tick().await;
    assert_eq!(report.token, Some(SlotResult::Succeeded));
    assert_eq!(rig.dashboard.read().await.token.token, "bearer new");

    let report = scheduler.tick().await;
    assert_eq!(report.token, None);
    assert_eq!(rig.scripted.request_count(), 2);
}

#[tokio::test]
async fn test_dark_uv_override_skips_network() {
    let mut dashboard = Dashboard::default();
    dashboard.weather.is_day = false;
    dashboard.weather.update_time = T0 - 60;
    dashboard.uv.index = 4;
    let rig = Rig::new(dashboard);
    let mut scheduler = rig.scheduler(vec![uv_feed()], None, None, None);

    let report = scheduler.tick().await;
    assert_eq!(report.result("uv"), Some(SlotResult::Overridden));
    assert_eq!(rig.scripted.request_count(), 0);
    assert!(rig.dirty.take(DirtyGroup::Uv));

    let dashboard = rig.dashboard.read().await;
    assert_eq!(dashboard.uv.index, 0);
    assert_eq!(dashboard.uv.update_time, T0);
    assert!(rig.dir.path().join("uv_data.bin").exists());
}

#[tokio::test]
async fn test_midnight_reading_resets_and_persists_battery_range() {
    let mut dashboard = Dashboard::default();
    dashboard.token.token = "bearer ok".to_string();
    dashboard.solar.extremes = BatteryExtremes { min: 20.0, max: 95.0 };
    let rig = Rig::new(dashboard);
    // 2023-11-15 00:05:00 UTC
    rig.clock.set(
        chrono::DateTime::from_timestamp(1_700_006_700, 0)
            .unwrap()
            .fixed_offset(),
    );
    let prefs = PrefsStore::open(rig.dir.path().join("prefs")).unwrap();
    let feed: Arc<dyn Feed> = Arc::new(SolarRealtimeFeed::new(&solar_config()));
    let mut scheduler = rig.scheduler(vec![feed], None, Some(prefs.clone()), None);

    rig.scripted.push(ScriptedReply::ok_json(REALTIME));
    scheduler.tick().await;

    let expected = BatteryExtremes { min: 55.0, max: 55.0 };
    let dashboard = rig.dashboard.read().await;
    assert!(dashboard.solar.minmax_reset);
    assert_eq!(dashboard.solar.extremes, expected);
    assert_eq!(prefs.load_extremes().unwrap(), expected);
}

#[tokio::test]
async fn test_update_check_triggers_restart_once() {
    let rig = Rig::new(Dashboard::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let check = UpdateCheck::new(
        "https://fw.test/version.txt",
        "0.1.0",
        300,
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let mut scheduler = rig.scheduler(Vec::new(), None, None, Some(check));

    rig.scripted.push(ScriptedReply::ok_json("0.2.0\n"));
    let report = scheduler.tick().await;
    assert_eq!(
        report.update,
        Some(UpdateOutcome::Triggered {
            version: "0.2.0".to_string()
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    rig.advance(60);
    let report = scheduler.tick().await;
    assert_eq!(report.update, Some(UpdateOutcome::NotDue));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_update_check_waits_for_link() {
    let rig = Rig::new(Dashboard::default());
    let check = UpdateCheck::new("https://fw.test/version.txt", "0.1.0", 300, Arc::new(|| {}));
    let mut scheduler = rig.scheduler(Vec::new(), None, None, Some(check));

    rig.link.set(false);
    assert_eq!(scheduler.tick().await.update, Some(UpdateOutcome::Skipped));

    rig.link.set(true);
    rig.scripted.push(ScriptedReply::status(404));
    assert_eq!(scheduler.tick().await.update, Some(UpdateOutcome::Failed));
    assert_eq!(scheduler.tick().await.update, Some(UpdateOutcome::NotDue));
}

#[tokio::test]
async fn test_watchdog_reset_once_per_tick_whatever_the_outcome() {
    let rig = Rig::new(Dashboard::default());
    let watchdog = Arc::new(CountingWatchdog::default());
    let solar: Arc<dyn Feed> = Arc::new(SolarRealtimeFeed::new(&solar_config()));
    let mut scheduler = rig.watched_scheduler(vec![weather_feed(), solar], watchdog.clone());

    rig.scripted.push(ScriptedReply::status(500));
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::Failed));
    assert_eq!(watchdog.0.load(Ordering::SeqCst), 1);

    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::NotDue));
    assert_eq!(report.result("solar_realtime"), Some(SlotResult::Gated));
    assert_eq!(watchdog.0.load(Ordering::SeqCst), 2);

    rig.advance(30);
    rig.link.set(false);
    let report = scheduler.tick().await;
    assert_eq!(report.result("weather"), Some(SlotResult::Skipped));
    assert_eq!(watchdog.0.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_expired_token_dropped_without_credentials() {
    let mut dashboard = Dashboard::default();
    dashboard.token.token = "bearer old".to_string();
    dashboard.token.acquired_at = T0 - 43_201;
    let restored = dashboard.token.clone();
    let rig = Rig::new(dashboard);
    rig.state_store().save_record(&restored).await.unwrap();
    let solar: Arc<dyn Feed> = Arc::new(SolarRealtimeFeed::new(&solar_config()));
    let mut scheduler = rig.scheduler(vec![solar], None, None, None);

    let report = scheduler.tick().await;
    assert_eq!(report.token, None);
    assert_eq!(report.result("solar_realtime"), Some(SlotResult::Gated));
    assert_eq!(rig.scripted.request_count(), 0);
    assert!(rig.dashboard.read().await.token.is_empty());

    let on_disk: AuthToken = rig.state_store().load_record().await.unwrap();
    assert!(on_disk.is_empty());
}

#[tokio::test]
async fn test_uv_body_timeout_leaves_update_time() {
    let mut dashboard = Dashboard::default();
    dashboard.weather.is_day = true;
    let rig = Rig::new(dashboard);
    let mut scheduler = rig.scheduler(vec![uv_feed()], None, None, None);

    rig.scripted.push(ScriptedReply::stalled(128, r#"{"data":[{"uv":"#));
    let report = scheduler.tick().await;

    assert_eq!(report.result("uv"), Some(SlotResult::Failed));
    assert_eq!(scheduler.backoff("uv").unwrap().fail_count, 1);
    assert_eq!(rig.dashboard.read().await.uv.update_time, 0);
}
