//! Adaptive polling: per-feed staleness, exponential backoff and the
//! trailing firmware check

pub mod backoff;
pub mod runner;
pub mod update_check;

pub use backoff::{BackoffPolicy, BackoffState};
pub use runner::{PollScheduler, SlotResult, TickReport};
pub use update_check::{UpdateCheck, UpdateOutcome, compare_versions};
