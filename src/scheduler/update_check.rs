//! Periodic firmware version check
//!
//! Not backed by [`BackoffState`](super::BackoffState): it runs on its own
//! interval, and an HTTP failure simply waits for the next one.

use crate::feeds::{FetchContext, FetchError};
use crate::host::UpdateTrigger;
use crate::report::Reporter;
use crate::transport::HttpRequest;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Compare dotted numeric versions; missing components count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(version: &str) -> Vec<u64> {
        version
            .trim()
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(char::is_ascii_digit)
                    .fold(0u64, |acc, c| acc.saturating_mul(10).saturating_add(u64::from(c as u8 - b'0')))
            })
            .collect()
    }

    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let left = a.get(i).copied().unwrap_or(0);
            let right = b.get(i).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Interval not elapsed or check disabled
    NotDue,
    /// No link or transport busy; retried next tick
    Skipped,
    UpToDate,
    Triggered { version: String },
    Failed,
}

pub struct UpdateCheck {
    url: String,
    current_version: String,
    interval_secs: i64,
    last_check: i64,
    trigger: Arc<dyn UpdateTrigger>,
}

impl UpdateCheck {
    pub fn new(
        url: impl Into<String>,
        current_version: impl Into<String>,
        interval_secs: i64,
        trigger: Arc<dyn UpdateTrigger>,
    ) -> Self {
        Self {
            url: url.into(),
            current_version: current_version.into(),
            interval_secs,
            last_check: 0,
            trigger,
        }
    }

    pub fn last_check(&self) -> i64 {
        self.last_check
    }

    pub fn is_due(&self, now: i64) -> bool {
        !self.url.is_empty() && now - self.last_check > self.interval_secs
    }

    pub async fn run(&mut self, ctx: &FetchContext<'_>, reporter: &Reporter) -> UpdateOutcome {
        let now = ctx.timestamp();
        if !self.is_due(now) {
            return UpdateOutcome::NotDue;
        }

        match ctx.fetch_body(HttpRequest::get(&self.url)).await {
            Ok(body) => {
                self.last_check = now;
                let version = String::from_utf8_lossy(&body).trim().to_string();
                if compare_versions(&version, &self.current_version).is_gt() {
                    reporter.log_and_publish(&format!(
                        "New firmware version available: {} (current: {})",
                        version, self.current_version
                    ));
                    self.trigger.trigger();
                    UpdateOutcome::Triggered { version }
                } else {
                    reporter.log_and_publish(&format!(
                        "Firmware version {} is up to date",
                        self.current_version
                    ));
                    UpdateOutcome::UpToDate
                }
            }
            Err(FetchError::Offline | FetchError::Busy) => UpdateOutcome::Skipped,
            Err(e) => {
                debug!(error = %e, "Version check failed");
                self.last_check = now;
                reporter.log_and_publish("Error fetching version file");
                UpdateOutcome::Failed
            }
        }
    }
}
