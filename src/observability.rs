//! Process counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the scheduler, the reporter and the log worker
#[derive(Debug, Default)]
pub struct Metrics {
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_skipped: AtomicU64,
    auth_rejections: AtomicU64,
    log_lines_dropped: AtomicU64,
    state_saves_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_succeeded(&self) {
        self.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Fetch returned "not applicable", e.g. no network link
    pub fn fetch_skipped(&self) {
        self.fetches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_rejected(&self) {
        self.auth_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_line_dropped(&self) {
        self.log_lines_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state_save_failed(&self) {
        self.state_saves_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "state_saves_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            fetches_skipped: self.fetches_skipped.load(Ordering::Relaxed),
            auth_rejections: self.auth_rejections.load(Ordering::Relaxed),
            log_lines_dropped: self.log_lines_dropped.load(Ordering::Relaxed),
            state_saves_failed: self.state_saves_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub fetches_skipped: u64,
    pub auth_rejections: u64,
    pub log_lines_dropped: u64,
    pub state_saves_failed: u64,
}
