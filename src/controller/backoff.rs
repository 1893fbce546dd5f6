//! Per-key exponential backoff for reconcile errors.
//!
//! Independent from the success-path requeue interval: a rollout that is
//! healthy requeues on `stepIntervalSeconds`, while a rollout whose reconcile
//! keeps erroring (telemetry unreachable, conflicting writes) backs off from
//! one second up to a thirty second ceiling, doubling on each consecutive
//! failure and resetting the moment a reconcile succeeds.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const CEILING: Duration = Duration::from_secs(30);

/// Tracks consecutive-failure counts per object key (`namespace/name`).
pub struct BackoffTracker {
    failures: Mutex<HashMap<String, u32>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns the delay to wait before the
    /// next attempt.
    pub fn record_failure(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().expect("backoff lock poisoned");
        let count = failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        backoff_for(*count)
    }

    /// Clears the failure count for `key` after a successful reconcile.
    pub fn record_success(&self, key: &str) {
        self.failures.lock().expect("backoff lock poisoned").remove(key);
    }
}

impl Default for BackoffTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_for(consecutive_failures: u32) -> Duration {
    let shift = consecutive_failures.saturating_sub(1).min(10);
    let scaled = BASE.saturating_mul(1 << shift);
    scaled.min(CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_backs_off_at_base_delay() {
        let tracker = BackoffTracker::new();
        assert_eq!(tracker.record_failure("ns/name"), Duration::from_secs(1));
    }

    #[test]
    fn consecutive_failures_double_until_ceiling() {
        let tracker = BackoffTracker::new();
        let key = "ns/name";
        assert_eq!(tracker.record_failure(key), Duration::from_secs(1));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(2));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(4));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(8));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(16));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(30));
        assert_eq!(tracker.record_failure(key), Duration::from_secs(30));
    }

    #[test]
    fn success_resets_backoff_for_that_key_only() {
        let tracker = BackoffTracker::new();
        tracker.record_failure("ns/a");
        tracker.record_failure("ns/a");
        tracker.record_failure("ns/b");

        tracker.record_success("ns/a");

        assert_eq!(tracker.record_failure("ns/a"), Duration::from_secs(1));
        assert_eq!(tracker.record_failure("ns/b"), Duration::from_secs(4));
    }

    #[test]
    fn unknown_key_success_is_a_no_op() {
        let tracker = BackoffTracker::new();
        tracker.record_success("never-failed");
    }
}
