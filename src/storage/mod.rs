//! Crash-safe local persistence
//!
//! Two stores share one [`StorageLock`]:
//! - [`StateStore`] keeps one checksummed fixed-size record per feed
//! - [`LogStore`] keeps size-bounded, rotating `timestamp|message` text logs
//!
//! Every file open/read-or-write/close sequence runs under the lock, so the
//! logging worker and the scheduler never interleave raw file operations.
//! The lock wait is bounded; an operation that cannot get the lock in time
//! fails instead of blocking.

pub mod codec;
pub mod error;
pub mod log;
pub mod state;

pub use error::{LoadError, LockTimeout, LogError, SaveError};
pub use log::{CLOCK_SYNC_THRESHOLD, ERROR_LOG, LogLine, LogStore, NORMAL_LOG};
pub use state::StateStore;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Data guarded together with the storage files
#[derive(Debug, Default)]
pub(crate) struct StorageState {
    /// Cached newline count per log file, filled lazily
    pub(crate) line_counts: HashMap<String, usize>,
}

/// Mutual exclusion for every file operation of the storage layer
#[derive(Debug, Clone)]
pub struct StorageLock {
    inner: Arc<Mutex<StorageState>>,
    wait: Duration,
}

impl StorageLock {
    pub fn new(wait: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StorageState::default())),
            wait,
        }
    }

    pub(crate) async fn acquire(&self) -> Result<MutexGuard<'_, StorageState>, LockTimeout> {
        tokio::time::timeout(self.wait, self.inner.lock())
            .await
            .map_err(|_| LockTimeout(self.wait))
    }
}
