//! Bounded hand-off between log producers and the log-writing worker
//!
//! Producers never wait: when the queue is full the entry is dropped and
//! counted, so logging cannot stall the scheduler.

mod worker;

pub use worker::{run_log_worker, spawn_log_worker};

use crate::observability::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Target log file, e.g. [`crate::storage::NORMAL_LOG`]
    pub log_name: &'static str,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LogQueue {
    tx: mpsc::Sender<LogEntry>,
    metrics: Arc<Metrics>,
}

impl LogQueue {
    /// Queue holding at most `capacity` pending entries, plus its receiving end
    pub fn bounded(capacity: usize, metrics: Arc<Metrics>) -> (Self, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    /// Hand an entry to the worker without waiting; false if it was dropped
    pub fn enqueue(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                self.metrics.log_line_dropped();
                debug!(log = entry.log_name, "Log queue full, entry dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
