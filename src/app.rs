//! Process wiring: stores, log worker, reporter, feeds and the poll loop

use crate::config::{Config, ConfigError};
use crate::feeds::{
    AirQualityFeed, Feed, HistoryPeriod, SolarHistoryFeed, SolarRealtimeFeed, SolarTokenFeed,
    UvFeed, WeatherFeed,
};
use crate::host::{Clock, LinkFlag, NoopWatchdog, RestartSignal, SoftWatchdog, SystemClock, Watchdog};
use crate::messaging::TracingPublisher;
use crate::observability::Metrics;
use crate::prefs::{PrefsError, PrefsStore};
use crate::queue::{LogQueue, spawn_log_worker};
use crate::report::Reporter;
use crate::scheduler::{BackoffPolicy, PollScheduler, UpdateCheck};
use crate::state::records::Record;
use crate::state::{AirQuality, AuthToken, Dashboard, DirtyFlags, Solar, Uv, Weather};
use crate::storage::{LogError, LogLine, LogStore, StateStore, StorageLock};
use crate::transport::http::ReqwestTransport;
use crate::transport::{SharedTransport, TransportError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

const PREFS_DIR: &str = "prefs";
const LOG_FLUSH_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Prefs store error: {0}")]
    Prefs(#[from] PrefsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why [`run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    /// A newer firmware version was found; the supervisor should restart us
    Restart,
}

/// Feed table in polling order, plus the token feed when credentials are set
pub fn build_feeds(config: &Config) -> (Vec<Arc<dyn Feed>>, Option<Arc<dyn Feed>>) {
    let feeds: Vec<Arc<dyn Feed>> = vec![
        Arc::new(UvFeed::new(
            &config.feeds.uv,
            &config.location,
            config.feeds.uv_api_key.as_deref(),
        )),
        Arc::new(WeatherFeed::new(&config.feeds.weather, &config.location)),
        Arc::new(AirQualityFeed::new(&config.feeds.air_quality, &config.location)),
        Arc::new(SolarRealtimeFeed::new(&config.solar)),
        Arc::new(SolarHistoryFeed::new(&config.solar, HistoryPeriod::Day)),
        Arc::new(SolarHistoryFeed::new(&config.solar, HistoryPeriod::Month)),
    ];
    let token_feed = SolarTokenFeed::new(&config.solar).map(|feed| Arc::new(feed) as Arc<dyn Feed>);
    (feeds, token_feed)
}

async fn restore_record<R: Record>(store: &StateStore, label: &str, reporter: &Reporter) -> Option<R> {
    match store.load_record::<R>().await {
        Ok(record) => {
            reporter.log_and_publish(&format!("{label} state restored OK"));
            Some(record)
        }
        Err(e) => {
            reporter.log_and_publish(&format!("{label} state restore failed: {}", e.kind()));
            None
        }
    }
}

/// Rebuild the dashboard from disk; anything that fails to load stays at its default
pub async fn restore_dashboard(store: &StateStore, prefs: Option<&PrefsStore>, reporter: &Reporter) -> Dashboard {
    let mut dashboard = Dashboard::default();
    if let Some(weather) = restore_record::<Weather>(store, "Weather", reporter).await {
        dashboard.weather = weather;
    }
    if let Some(uv) = restore_record::<Uv>(store, "UV", reporter).await {
        dashboard.uv = uv;
    }
    if let Some(air_quality) = restore_record::<AirQuality>(store, "Air quality", reporter).await {
        dashboard.air_quality = air_quality;
    }
    if let Some(solar) = restore_record::<Solar>(store, "Solar", reporter).await {
        dashboard.solar = solar;
    }
    if let Some(token) = restore_record::<AuthToken>(store, "Solar token", reporter).await {
        dashboard.token = token;
    }

    if let Some(prefs) = prefs {
        match prefs.load_extremes() {
            Ok(extremes) => dashboard.solar.extremes = extremes,
            Err(e) => warn!(error = %e, "Battery range restore failed, using defaults"),
        }
    }
    dashboard
}

pub async fn run(config: Config) -> Result<Exit> {
    run_until(config, shutdown_signal()).await
}

/// Run the poller until `shutdown` resolves or an update asks for a restart
pub async fn run_until<F>(config: Config, shutdown: F) -> Result<Exit>
where
    F: std::future::Future<Output = ()>,
{
    let data_dir = config.storage.data_dir.clone();
    tokio::fs::create_dir_all(&data_dir).await?;

    let lock = StorageLock::new(Duration::from_millis(config.storage.lock_wait_ms));
    let state_store = StateStore::new(&data_dir, lock.clone());
    let log_store = LogStore::new(&data_dir, lock, config.storage.log_max_bytes.as_u64());
    let prefs = PrefsStore::open(data_dir.join(PREFS_DIR))?;

    let metrics = Arc::new(Metrics::new());
    let (queue, rx) = LogQueue::bounded(config.storage.log_queue_size, metrics.clone());
    let log_worker = spawn_log_worker(rx, log_store);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reporter = Reporter::new(
        queue,
        Arc::new(TracingPublisher::new()),
        clock.clone(),
        config.messaging.log_topic(),
        config.messaging.error_topic(),
    );
    reporter.log_and_publish(&format!("Starting dashfeed {}", config.update.current_version));

    let dashboard = restore_dashboard(&state_store, Some(&prefs), &reporter).await;
    let dashboard = Arc::new(RwLock::new(dashboard));

    let transport = SharedTransport::new(
        ReqwestTransport::new(&config.http)?,
        Duration::from_secs(config.http.transport_wait_secs),
    );

    let watchdog: Arc<dyn Watchdog> = match config.scheduler.watchdog_timeout_secs {
        0 => Arc::new(NoopWatchdog),
        secs => Arc::new(SoftWatchdog::spawn(Duration::from_secs(secs))),
    };

    let (restart, mut restart_rx) = RestartSignal::channel();
    let update_check = (!config.update.version_url.is_empty()).then(|| {
        UpdateCheck::new(
            config.update.version_url.clone(),
            config.update.current_version.clone(),
            config.scheduler.update_check_interval_secs as i64,
            Arc::new(restart),
        )
    });

    let (feeds, token_feed) = build_feeds(&config);
    if token_feed.is_none() {
        warn!("Solar credentials not configured, solar feeds use the stored token only");
    }

    let scheduler = PollScheduler::builder()
        .dashboard(dashboard)
        .dirty(Arc::new(DirtyFlags::new()))
        .feeds(feeds)
        .maybe_token_feed(token_feed)
        .maybe_update_check(update_check)
        .transport(transport)
        .link(Arc::new(LinkFlag::new(true)))
        .clock(clock)
        .watchdog(watchdog)
        .state_store(state_store)
        .prefs(prefs)
        .reporter(reporter)
        .metrics(metrics.clone())
        .policy(BackoffPolicy::from(&config.scheduler))
        .token_max_age_secs(config.scheduler.token_max_age_secs as i64)
        .payload_capacity(config.http.payload_capacity.as_usize())
        .tick(Duration::from_secs(config.scheduler.tick_secs))
        .build();

    let restart_requested = async move {
        while restart_rx.changed().await.is_ok() {
            if *restart_rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await
    };

    let exit = tokio::select! {
        _ = scheduler.run(shutdown) => Exit::Shutdown,
        _ = restart_requested => Exit::Restart,
    };

    // Every reporter clone is gone now, so the worker drains and stops
    if tokio::time::timeout(LOG_FLUSH_WAIT, log_worker).await.is_err() {
        warn!("Log worker did not finish in time");
    }
    info!(?exit, metrics = ?metrics.snapshot(), "Dashfeed stopped");
    Ok(exit)
}

/// Newest-first entries from one of the trail logs
pub async fn read_logs(config: &Config, log_name: &str, limit: usize) -> Result<Vec<LogLine>> {
    let store = open_log_store(&config.storage.data_dir, config);
    Ok(store.read_recent(log_name, limit).await?)
}

fn open_log_store(data_dir: &Path, config: &Config) -> LogStore {
    let lock = StorageLock::new(Duration::from_millis(config.storage.lock_wait_ms));
    LogStore::new(data_dir, lock, config.storage.log_max_bytes.as_u64())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
