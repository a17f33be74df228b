//! Per-source health tracking
//!
//! Every completed fetch attempt is reported here as a [`FetchOutcome`]. The
//! tracker keeps cumulative statistics and a trailing window of the most
//! recent attempts, and derives [`SourceStatus`] from the window's error rate:
//!
//! | error rate     | status    |
//! |----------------|-----------|
//! | no attempts    | INACTIVE  |
//! | 0              | ACTIVE    |
//! | (0, 0.5]       | WARNING   |
//! | > 0.5          | ERROR     |
//!
//! The tracker is the only writer of status, error count, last error and
//! last update time. Everything else reads snapshots.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::models::{FetchOutcome, SourceHealth, SourceStatus};

/// Default number of attempts a status is derived from
pub const DEFAULT_WINDOW: usize = 10;

// ============================================================================
// Health Record
// ============================================================================

#[derive(Debug, Clone)]
struct HealthRecord {
    /// `true` for failed attempts, newest at the back
    window: VecDeque<bool>,
    health: SourceHealth,
    /// Attempts that contributed a response time to the average
    timed_samples: u64,
}

impl HealthRecord {
    fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            health: SourceHealth::default(),
            timed_samples: 0,
        }
    }

    fn apply(&mut self, outcome: &FetchOutcome, window_size: usize) -> SourceStatus {
        let health = &mut self.health;
        health.total_requests += 1;

        if outcome.success {
            health.success_count += 1;
            health.error_count = 0;
            health.last_error = None;
            health.last_updated = Some(Utc::now());
            health.last_response_ms = Some(outcome.response_time_ms);

            let prev = self.timed_samples as f64;
            health.avg_response_ms =
                (health.avg_response_ms * prev + outcome.response_time_ms as f64) / (prev + 1.0);
            self.timed_samples += 1;
        } else {
            health.error_count += 1;
            health.last_error = Some(
                outcome
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            );
        }

        health.success_rate = health.success_count as f64 / health.total_requests as f64;

        if self.window.len() >= window_size {
            self.window.pop_front();
        }
        self.window.push_back(!outcome.success);

        let errors = self.window.iter().filter(|failed| **failed).count();
        health.status = SourceStatus::from_error_rate(errors as u64, self.window.len() as u64);
        health.status
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Number of sources per status
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub active: usize,
    pub warning: usize,
    pub error: usize,
    pub inactive: usize,
}

impl HealthSummary {
    pub fn total(&self) -> usize {
        self.active + self.warning + self.error + self.inactive
    }

    pub fn count(&self, status: SourceStatus) -> usize {
        match status {
            SourceStatus::Active => self.active,
            SourceStatus::Warning => self.warning,
            SourceStatus::Error => self.error,
            SourceStatus::Inactive => self.inactive,
        }
    }

    /// Pairs in [`SourceStatus::all`] order
    pub fn as_pairs(&self) -> Vec<(SourceStatus, usize)> {
        SourceStatus::all()
            .into_iter()
            .map(|status| (status, self.count(status)))
            .collect()
    }
}

// ============================================================================
// Health Tracker
// ============================================================================

/// Thread-safe tracker for all registered sources
pub struct HealthTracker {
    records: RwLock<HashMap<String, HealthRecord>>,
    window_size: usize,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl HealthTracker {
    /// Create a tracker rating sources on their last `window_size` attempts
    pub fn new(window_size: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Start tracking a source as INACTIVE; existing records are kept
    pub fn register(&self, source_id: &str) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .entry(source_id.to_string())
            .or_insert_with(|| HealthRecord::new(self.window_size));
    }

    /// Apply one attempt's outcome and return the new status
    pub fn record(&self, outcome: &FetchOutcome) -> SourceStatus {
        let (previous, status) = {
            let mut records = self
                .records
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let record = records
                .entry(outcome.source_id.clone())
                .or_insert_with(|| HealthRecord::new(self.window_size));
            let previous = record.health.status;
            (previous, record.apply(outcome, self.window_size))
        };

        if previous != status {
            match status {
                SourceStatus::Error => tracing::warn!(
                    source_id = %outcome.source_id,
                    from = %previous,
                    to = %status,
                    error = outcome.error_message.as_deref().unwrap_or(""),
                    "Source status changed"
                ),
                _ => tracing::info!(
                    source_id = %outcome.source_id,
                    from = %previous,
                    to = %status,
                    "Source status changed"
                ),
            }
        }

        status
    }

    /// Current health of a source
    pub fn snapshot(&self, source_id: &str) -> Option<SourceHealth> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.get(source_id).map(|record| record.health.clone())
    }

    pub fn status(&self, source_id: &str) -> Option<SourceStatus> {
        self.snapshot(source_id).map(|health| health.status)
    }

    /// Count sources per status
    pub fn summary(&self) -> HealthSummary {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut summary = HealthSummary::default();
        for record in records.values() {
            match record.health.status {
                SourceStatus::Active => summary.active += 1,
                SourceStatus::Warning => summary.warning += 1,
                SourceStatus::Error => summary.error += 1,
                SourceStatus::Inactive => summary.inactive += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ok(ms: u64) -> FetchOutcome {
        FetchOutcome::success("s", 5, ms)
    }

    fn fail() -> FetchOutcome {
        FetchOutcome::failure("s", 10, "HTTP 503")
    }

    #[test]
    fn test_registered_source_is_inactive() {
        let tracker = HealthTracker::default();
        tracker.register("s");

        let health = tracker.snapshot("s").unwrap();
        assert_eq!(health.status, SourceStatus::Inactive);
        assert_eq!(health.total_requests, 0);
        assert!(tracker.snapshot("other").is_none());
    }

    #[test]
    fn test_status_over_ten_attempts() {
        // 6 of 10 failed
        let tracker = HealthTracker::new(10);
        for i in 0..10 {
            tracker.record(&if i < 6 { fail() } else { ok(100) });
        }
        assert_eq!(tracker.status("s"), Some(SourceStatus::Error));

        // 2 of 10 failed
        let tracker = HealthTracker::new(10);
        for i in 0..10 {
            tracker.record(&if i < 2 { fail() } else { ok(100) });
        }
        assert_eq!(tracker.status("s"), Some(SourceStatus::Warning));

        let tracker = HealthTracker::new(10);
        for _ in 0..10 {
            tracker.record(&ok(100));
        }
        assert_eq!(tracker.status("s"), Some(SourceStatus::Active));
    }

    #[test]
    fn test_window_forgets_old_failures() {
        let tracker = HealthTracker::new(4);
        for _ in 0..4 {
            tracker.record(&fail());
        }
        assert_eq!(tracker.status("s"), Some(SourceStatus::Error));

        for _ in 0..4 {
            tracker.record(&ok(50));
        }
        assert_eq!(tracker.status("s"), Some(SourceStatus::Active));

        let health = tracker.snapshot("s").unwrap();
        assert_eq!(health.total_requests, 8);
        assert!((health.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_resets_streak_and_error() {
        let tracker = HealthTracker::default();
        tracker.record(&fail());
        tracker.record(&fail());

        let health = tracker.snapshot("s").unwrap();
        assert_eq!(health.error_count, 2);
        assert_eq!(health.last_error.as_deref(), Some("HTTP 503"));
        assert!(health.last_updated.is_none());

        tracker.record(&ok(120));
        let health = tracker.snapshot("s").unwrap();
        assert_eq!(health.error_count, 0);
        assert!(health.last_error.is_none());
        assert!(health.last_updated.is_some());
        assert_eq!(health.last_response_ms, Some(120));
    }

    #[test]
    fn test_average_response_time_over_successes() {
        let tracker = HealthTracker::default();
        tracker.record(&ok(100));
        tracker.record(&fail());
        tracker.record(&ok(300));

        let health = tracker.snapshot("s").unwrap();
        assert!((health.avg_response_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let tracker = HealthTracker::default();
        tracker.register("idle");
        tracker.record(&FetchOutcome::success("good", 1, 10));
        tracker.record(&FetchOutcome::failure("bad", 10, "boom"));

        let summary = tracker.summary();
        assert_eq!(summary.active, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.inactive, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.as_pairs().len(), 4);
    }

    proptest! {
        #[test]
        fn prop_status_matches_window_error_rate(attempts in prop::collection::vec(any::<bool>(), 1..40)) {
            let tracker = HealthTracker::new(DEFAULT_WINDOW);
            let mut status = SourceStatus::Inactive;
            for failed in &attempts {
                status = tracker.record(&if *failed { fail() } else { ok(10) });
            }

            let window: Vec<&bool> = attempts.iter().rev().take(DEFAULT_WINDOW).collect();
            let errors = window.iter().filter(|f| ***f).count();
            let expected = if errors == 0 {
                SourceStatus::Active
            } else if errors as f64 / window.len() as f64 <= 0.5 {
                SourceStatus::Warning
            } else {
                SourceStatus::Error
            };
            prop_assert_eq!(status, expected);

            let health = tracker.snapshot("s").unwrap();
            prop_assert_eq!(health.total_requests, attempts.len() as u64);
        }
    }
}
