//! Next-due computation
//!
//! Healthy sources run at their baseline interval. A source in ERROR status
//! is pushed further out with bounded exponential growth:
//!
//! ```text
//! interval = min(base * multiplier^(failures - 1), max_interval)   (never below base)
//! ```

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::config::BackoffConfig;
use crate::models::{SourceStatus, MAX_UPDATE_INTERVAL_SECS};

/// Seconds until the next attempt
pub fn next_interval(
    base_secs: u64,
    status: SourceStatus,
    consecutive_failures: u32,
    config: &BackoffConfig,
) -> u64 {
    if status != SourceStatus::Error || consecutive_failures == 0 {
        return base_secs;
    }

    let exponent = consecutive_failures.saturating_sub(1).min(63) as i32;
    let grown = base_secs as f64 * config.multiplier.powi(exponent);
    let capped = grown.min(config.max_interval_secs as f64);

    (capped as u64).max(base_secs)
}

/// `now + interval`, spread by up to `±jitter_ratio * interval`
///
/// Intervals beyond [`MAX_UPDATE_INTERVAL_SECS`] are clamped to it.
pub fn due_after(now: DateTime<Utc>, interval_secs: u64, jitter_ratio: f64) -> DateTime<Utc> {
    let interval_ms = (interval_secs.min(MAX_UPDATE_INTERVAL_SECS) * 1000) as i64;

    let offset_ms = if jitter_ratio > 0.0 && interval_ms > 0 {
        let spread = (interval_ms as f64 * jitter_ratio) as i64;
        if spread > 0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0
        }
    } else {
        0
    };

    now.checked_add_signed(Duration::milliseconds(interval_ms.saturating_add(offset_ms).max(0)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            multiplier: 2.0,
            max_interval_secs: 3600,
            jitter_ratio: 0.0,
        }
    }

    #[test]
    fn test_baseline_for_healthy_statuses() {
        for status in [SourceStatus::Active, SourceStatus::Warning, SourceStatus::Inactive] {
            assert_eq!(next_interval(300, status, 5, &config()), 300);
        }
    }

    #[test]
    fn test_exponential_growth_in_error() {
        let c = config();
        assert_eq!(next_interval(300, SourceStatus::Error, 1, &c), 300);
        assert_eq!(next_interval(300, SourceStatus::Error, 2, &c), 600);
        assert_eq!(next_interval(300, SourceStatus::Error, 3, &c), 1200);
        assert_eq!(next_interval(300, SourceStatus::Error, 4, &c), 2400);
    }

    #[test]
    fn test_backoff_is_capped() {
        let c = config();
        assert_eq!(next_interval(300, SourceStatus::Error, 5, &c), 3600);
        assert_eq!(next_interval(300, SourceStatus::Error, 1000, &c), 3600);
    }

    #[test]
    fn test_never_below_base() {
        // Base already above the cap
        assert_eq!(next_interval(7200, SourceStatus::Error, 3, &config()), 7200);
    }

    #[test]
    fn test_due_after_without_jitter() {
        let now = Utc::now();
        assert_eq!(due_after(now, 60, 0.0), now + Duration::seconds(60));
    }

    #[test]
    fn test_due_after_jitter_bounds() {
        let now = Utc::now();
        for _ in 0..100 {
            let due = due_after(now, 100, 0.1);
            assert!(due >= now + Duration::seconds(90));
            assert!(due <= now + Duration::seconds(110));
        }
    }

    #[test]
    fn test_due_after_clamps_huge_intervals() {
        let now = Utc::now();
        let cap = now + Duration::seconds(MAX_UPDATE_INTERVAL_SECS as i64);

        assert_eq!(due_after(now, u64::MAX, 0.0), cap);
        assert!(due_after(now, u64::MAX, 0.5) <= cap + Duration::seconds(MAX_UPDATE_INTERVAL_SECS as i64 / 2));
        assert_eq!(due_after(DateTime::<Utc>::MAX_UTC, 60, 0.0), DateTime::<Utc>::MAX_UTC);
    }
}
