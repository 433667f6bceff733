//! The poll loop
//!
//! One pass per tick, in fixed order: refresh the solar token, walk the feed
//! table, then run the firmware check. Fetches are sequential and every
//! failure is a value, so a bad feed never stops the loop.

use super::backoff::{BackoffPolicy, BackoffState};
use super::update_check::{UpdateCheck, UpdateOutcome};
use crate::feeds::{Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError, FetchOutcome, RecordKind};
use crate::host::{Clock, LinkStatus, NoopWatchdog, Watchdog};
use crate::observability::Metrics;
use crate::prefs::PrefsStore;
use crate::report::Reporter;
use crate::state::{Dashboard, DirtyFlags, SharedDashboard};
use crate::storage::StateStore;
use crate::transport::SharedTransport;
use bon::bon;
use chrono::{DateTime, FixedOffset};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to one feed during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResult {
    /// Interval not elapsed or still backing off
    NotDue,
    /// Override applied, no network I/O
    Overridden,
    /// Token-dependent feed with no token
    Gated,
    Succeeded,
    Failed,
    /// Fetch not applicable, e.g. no network link
    Skipped,
    AuthRejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `None` when the token was valid and left alone
    pub token: Option<SlotResult>,
    pub feeds: Vec<(&'static str, SlotResult)>,
    pub update: Option<UpdateOutcome>,
}

impl TickReport {
    pub fn result(&self, feed: &str) -> Option<SlotResult> {
        self.feeds
            .iter()
            .find(|(name, _)| *name == feed)
            .map(|(_, result)| *result)
    }
}

struct FeedSlot {
    feed: Arc<dyn Feed>,
    backoff: BackoffState,
}

pub struct PollScheduler {
    dashboard: SharedDashboard,
    dirty: Arc<DirtyFlags>,
    slots: Vec<FeedSlot>,
    token_feed: Option<Arc<dyn Feed>>,
    update_check: Option<UpdateCheck>,
    transport: SharedTransport,
    link: Arc<dyn LinkStatus>,
    clock: Arc<dyn Clock>,
    watchdog: Arc<dyn Watchdog>,
    state_store: StateStore,
    prefs: Option<PrefsStore>,
    reporter: Reporter,
    metrics: Arc<Metrics>,
    policy: BackoffPolicy,
    token_max_age_secs: i64,
    payload_capacity: usize,
    tick: Duration,
}

#[bon]
impl PollScheduler {
    /// Feeds are polled in the order given
    #[builder]
    pub fn new(
        dashboard: SharedDashboard,
        dirty: Arc<DirtyFlags>,
        feeds: Vec<Arc<dyn Feed>>,
        token_feed: Option<Arc<dyn Feed>>,
        update_check: Option<UpdateCheck>,
        transport: SharedTransport,
        link: Arc<dyn LinkStatus>,
        clock: Arc<dyn Clock>,
        watchdog: Option<Arc<dyn Watchdog>>,
        state_store: StateStore,
        prefs: Option<PrefsStore>,
        reporter: Reporter,
        metrics: Arc<Metrics>,
        #[builder(default)] policy: BackoffPolicy,
        #[builder(default = 43_200)] token_max_age_secs: i64,
        #[builder(default = 4096)] payload_capacity: usize,
        #[builder(default = Duration::from_secs(10))] tick: Duration,
    ) -> Self {
        let watchdog: Arc<dyn Watchdog> = match watchdog {
            Some(watchdog) => watchdog,
            None => Arc::new(NoopWatchdog),
        };
        let slots = feeds
            .into_iter()
            .map(|feed| FeedSlot {
                feed,
                backoff: BackoffState::default(),
            })
            .collect();

        Self {
            dashboard,
            dirty,
            slots,
            token_feed,
            update_check,
            transport,
            link,
            clock,
            watchdog,
            state_store,
            prefs,
            reporter,
            metrics,
            policy,
            token_max_age_secs,
            payload_capacity,
            tick,
        }
    }
}

impl PollScheduler {
    pub fn backoff(&self, feed: &str) -> Option<BackoffState> {
        self.slots
            .iter()
            .find(|slot| slot.feed.descriptor().name == feed)
            .map(|slot| slot.backoff)
    }

    pub fn dashboard(&self) -> SharedDashboard {
        self.dashboard.clone()
    }

    pub fn dirty(&self) -> Arc<DirtyFlags> {
        self.dirty.clone()
    }

    /// Tick until `shutdown` resolves. A pass in progress always completes.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            feeds = self.slots.len(),
            tick_secs = self.tick.as_secs(),
            "Poll scheduler started"
        );
        tokio::pin!(shutdown);

        loop {
            let report = self.tick().await;
            debug!(?report, metrics = ?self.metrics.snapshot(), "Tick complete");

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
        }
        info!("Poll scheduler stopped");
    }

    /// One full pass over the token, the feed table and the update check
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport {
            token: self.refresh_token(&now).await,
            ..TickReport::default()
        };

        for index in 0..self.slots.len() {
            let name = self.slots[index].feed.descriptor().name;
            let result = self.poll_slot(index, &now).await;
            report.feeds.push((name, result));
        }

        report.update = self.check_for_update(&now).await;
        self.watchdog.reset();
        report
    }

    async fn snapshot(&self) -> Dashboard {
        self.dashboard.read().await.clone()
    }

    async fn fetch(&self, feed: &dyn Feed, snapshot: &Dashboard, now: &DateTime<FixedOffset>) -> FetchOutcome {
        let ctx = FetchContext {
            transport: &self.transport,
            link: self.link.as_ref(),
            now: *now,
            dashboard: snapshot,
            payload_capacity: self.payload_capacity,
        };
        FetchOutcome::from(feed.fetch(&ctx).await)
    }

    async fn refresh_token(&mut self, now: &DateTime<FixedOffset>) -> Option<SlotResult> {
        let timestamp = now.timestamp();

        let (snapshot, cleared) = {
            let mut dashboard = self.dashboard.write().await;
            let token = &mut dashboard.token;
            let cleared = !token.is_empty();
            if cleared {
                if !token.is_expired(timestamp, self.token_max_age_secs) {
                    return None;
                }
                info!(age_secs = timestamp - token.acquired_at, "Solar token expired");
                token.clear();
            }
            (dashboard.clone(), cleared)
        };

        // Without credentials an expired token is only dropped, never replaced
        let Some(feed) = self.token_feed.clone() else {
            if cleared {
                self.persist(RecordKind::Token, &snapshot).await;
            }
            return None;
        };

        let result = match self.fetch(feed.as_ref(), &snapshot, now).await {
            FetchOutcome::Success(update) => {
                self.metrics.fetch_succeeded();
                self.commit(update).await;
                SlotResult::Succeeded
            }
            FetchOutcome::NotApplicable => {
                self.metrics.fetch_skipped();
                SlotResult::Skipped
            }
            FetchOutcome::Failed(e) => {
                self.metrics.fetch_failed();
                self.report_failure(feed.descriptor(), &e);
                SlotResult::Failed
            }
            FetchOutcome::AuthRejected => {
                self.metrics.fetch_failed();
                self.report_failure(feed.descriptor(), &FetchError::AuthRejected);
                SlotResult::Failed
            }
        };
        Some(result)
    }

    async fn poll_slot(&mut self, index: usize, now: &DateTime<FixedOffset>) -> SlotResult {
        let feed = self.slots[index].feed.clone();
        let descriptor = feed.descriptor();
        let snapshot = self.snapshot().await;
        let timestamp = now.timestamp();

        if let Some(update) = feed.override_update(&snapshot, now) {
            self.commit(update).await;
            return SlotResult::Overridden;
        }
        if descriptor.requires_token && snapshot.token.is_empty() {
            return SlotResult::Gated;
        }
        let stale = timestamp - feed.last_update(&snapshot) > descriptor.interval_secs;
        if !stale || !self.slots[index].backoff.can_retry(timestamp) {
            return SlotResult::NotDue;
        }

        match self.fetch(feed.as_ref(), &snapshot, now).await {
            FetchOutcome::Success(update) => {
                self.slots[index].backoff.reset();
                self.metrics.fetch_succeeded();
                self.commit(update).await;
                SlotResult::Succeeded
            }
            FetchOutcome::Failed(e) => {
                if e.is_decode_failure() {
                    let mut dashboard = self.dashboard.write().await;
                    feed.on_decode_failure(&mut dashboard, timestamp);
                }
                let backoff = &mut self.slots[index].backoff;
                backoff.apply_failure(timestamp, &self.policy);
                warn!(
                    feed = descriptor.name,
                    error = %e,
                    fail_count = backoff.fail_count,
                    next_retry = backoff.next_retry_time,
                    "Fetch failed"
                );
                self.metrics.fetch_failed();
                self.report_failure(descriptor, &e);
                SlotResult::Failed
            }
            FetchOutcome::NotApplicable => {
                debug!(feed = descriptor.name, "No network link, fetch skipped");
                self.metrics.fetch_skipped();
                SlotResult::Skipped
            }
            FetchOutcome::AuthRejected => {
                self.metrics.auth_rejected();
                self.drop_token().await;
                SlotResult::AuthRejected
            }
        }
    }

    async fn check_for_update(&mut self, now: &DateTime<FixedOffset>) -> Option<UpdateOutcome> {
        let mut check = self.update_check.take()?;
        let snapshot = self.snapshot().await;
        let ctx = FetchContext {
            transport: &self.transport,
            link: self.link.as_ref(),
            now: *now,
            dashboard: &snapshot,
            payload_capacity: self.payload_capacity,
        };
        let outcome = check.run(&ctx, &self.reporter).await;
        self.update_check = Some(check);
        Some(outcome)
    }

    /// Clear a rejected token so the next tick acquires a fresh one
    async fn drop_token(&self) {
        let snapshot = {
            let mut dashboard = self.dashboard.write().await;
            let len = dashboard.token.token.len();
            dashboard.token.clear();
            self.reporter.log_and_publish(&format!(
                "Solar token rejected (len={len}), clearing for refresh"
            ));
            dashboard.clone()
        };
        self.persist(RecordKind::Token, &snapshot).await;
    }

    /// Apply an update under the write lock, then raise flags and write through
    async fn commit(&self, update: FeedUpdate) {
        let summary = update.summary();
        let (applied, snapshot) = {
            let mut dashboard = self.dashboard.write().await;
            let applied = update.apply(&mut dashboard);
            (applied, dashboard.clone())
        };

        if let Some(group) = applied.group {
            self.dirty.mark(group);
        }
        if let Some(summary) = summary {
            self.reporter.log_and_publish(&summary);
        }
        if let Some(kind) = applied.record {
            self.persist(kind, &snapshot).await;
        }
        if applied.extremes_changed {
            if let Some(prefs) = &self.prefs {
                if let Err(e) = prefs.save_extremes(&snapshot.solar.extremes) {
                    self.metrics.state_save_failed();
                    warn!(error = %e, "Saving battery range failed");
                }
            }
        }
    }

    /// A failed save leaves memory ahead of disk until the next good save
    async fn persist(&self, kind: RecordKind, snapshot: &Dashboard) {
        let store = &self.state_store;
        let result = match kind {
            RecordKind::Weather => store.save_record(&snapshot.weather).await,
            RecordKind::Uv => store.save_record(&snapshot.uv).await,
            RecordKind::AirQuality => store.save_record(&snapshot.air_quality).await,
            RecordKind::Solar => store.save_record(&snapshot.solar).await,
            RecordKind::Token => store.save_record(&snapshot.token).await,
        };
        if let Err(e) = result {
            self.metrics.state_save_failed();
            self.reporter.error_publish(&format!("State save failed: {e}"));
        }
    }

    fn report_failure(&self, descriptor: &FeedDescriptor, error: &FetchError) {
        let label = descriptor.label;
        match error {
            FetchError::Status(code) => {
                self.reporter.error_publish(&format!(
                    "[HTTP] {label} request failed, error code is {code}"
                ));
                self.reporter.log_and_publish(&format!("{label} update failed"));
            }
            FetchError::Payload(_) => {
                self.reporter
                    .log_and_publish(&format!("{label} update failed: Payload read error"));
            }
            FetchError::Decode(_) => {
                self.reporter
                    .log_and_publish(&format!("{label} update failed: Decode error"));
            }
            FetchError::Api(msg) => {
                self.reporter.error_publish(&format!("{label} failed: {msg}"));
            }
            other => {
                self.reporter
                    .error_publish(&format!("[HTTP] {label} request failed, error: {other}"));
                self.reporter.log_and_publish(&format!("{label} update failed"));
            }
        }
    }
}
