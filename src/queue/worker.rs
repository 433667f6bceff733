use super::LogEntry;
use crate::storage::{LogError, LogStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Drain the queue into the log files until every sender is gone
pub async fn run_log_worker(mut rx: mpsc::Receiver<LogEntry>, store: LogStore) {
    info!("Log worker started");
    while let Some(entry) = rx.recv().await {
        match store
            .append(entry.log_name, entry.timestamp, &entry.message)
            .await
        {
            Ok(()) => {}
            Err(LogError::LockTimeout(e)) => {
                warn!(log = entry.log_name, error = %e, "Log entry skipped, storage busy");
            }
            Err(e) => warn!(log = entry.log_name, error = %e, "Log append failed"),
        }
    }
    info!("Log worker stopped");
}

pub fn spawn_log_worker(rx: mpsc::Receiver<LogEntry>, store: LogStore) -> JoinHandle<()> {
    tokio::spawn(run_log_worker(rx, store))
}
