//! Per-feed exponential backoff

use crate::config::SchedulerConfig;

/// Delay policy shared by every feed slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_secs: i64,
    pub cap_secs: i64,
    /// `fail_count` saturates here
    pub max_fail_count: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 30,
            cap_secs: 300,
            max_fail_count: 32,
        }
    }
}

impl From<&SchedulerConfig> for BackoffPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            base_secs: config.backoff_base_secs as i64,
            cap_secs: config.backoff_cap_secs as i64,
            max_fail_count: config.max_fail_count,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^(fail_count - 1), cap)`; zero before the first failure
    pub fn delay(&self, fail_count: u32) -> i64 {
        if fail_count == 0 {
            return 0;
        }
        let shift = (fail_count - 1).min(62);
        self.base_secs
            .checked_mul(1i64 << shift)
            .map_or(self.cap_secs, |delay| delay.min(self.cap_secs))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub fail_count: u32,
    /// Unix seconds; 0 means "retry now"
    pub next_retry_time: i64,
}

impl BackoffState {
    pub fn can_retry(&self, now: i64) -> bool {
        now >= self.next_retry_time
    }

    /// Count a failure and push the next attempt out; never moves the retry time backwards
    pub fn apply_failure(&mut self, now: i64, policy: &BackoffPolicy) {
        self.fail_count = (self.fail_count + 1).min(policy.max_fail_count.max(1));
        let next = now.saturating_add(policy.delay(self.fail_count));
        self.next_retry_time = self.next_retry_time.max(next);
    }

    pub fn reset(&mut self) {
        self.fail_count = 0;
        self.next_retry_time = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<i64> = (1..=6).map(|n| policy.delay(n)).collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300]);
        assert_eq!(policy.delay(u32::MAX), 300);
    }

    #[test]
    fn test_delay_is_monotonic_and_bounded() {
        let policy = BackoffPolicy {
            base_secs: 7,
            cap_secs: 1000,
            max_fail_count: 32,
        };
        let mut previous = 0;
        for n in 1..=80 {
            let delay = policy.delay(n);
            assert!(delay >= previous);
            assert!(delay <= policy.cap_secs);
            previous = delay;
        }
    }

    #[test]
    fn test_apply_failure_schedules_retry() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::default();

        state.apply_failure(1_000, &policy);
        assert_eq!(state.fail_count, 1);
        assert_eq!(state.next_retry_time, 1_030);
        assert!(!state.can_retry(1_029));
        assert!(state.can_retry(1_030));

        state.apply_failure(1_030, &policy);
        assert_eq!(state.next_retry_time, 1_090);
    }

    #[test]
    fn test_fail_count_saturates() {
        let policy = BackoffPolicy {
            max_fail_count: 4,
            ..BackoffPolicy::default()
        };
        let mut state = BackoffState::default();
        for _ in 0..10 {
            state.apply_failure(0, &policy);
        }
        assert_eq!(state.fail_count, 4);
    }

    #[test]
    fn test_retry_time_never_moves_back() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState {
            fail_count: 5,
            next_retry_time: 10_000,
        };
        state.apply_failure(100, &policy);
        assert_eq!(state.next_retry_time, 10_000);
    }

    #[test]
    fn test_reset_allows_retry() {
        let mut state = BackoffState {
            fail_count: 9,
            next_retry_time: i64::MAX,
        };
        state.reset();
        assert_eq!(state, BackoffState::default());
        assert!(state.can_retry(0));
    }
}
