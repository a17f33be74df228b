//! Per-source scheduling state and the single-flight guard
//!
//! Each source owns one [`SourceSlot`]. Starting a fetch goes through
//! [`SourceSlot::begin`]: the first caller becomes the leader and receives a
//! [`FlightGuard`]; callers arriving while that fetch runs receive a
//! [`watch::Receiver`] that yields the leader's result.
//!
//! The state mutex is a plain `std::sync::Mutex` and is never held across
//! an `.await`.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Scheduling state of one source
#[derive(Debug)]
pub struct SchedulerState {
    pub next_due_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Present while a fetch is running; resolves to its success flag
    flight: Option<watch::Receiver<Option<bool>>>,
}

impl SchedulerState {
    pub fn in_flight(&self) -> bool {
        self.flight.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.in_flight() && self.next_due_at <= now
    }
}

/// Outcome of trying to start a fetch
pub enum Flight {
    /// This caller runs the fetch
    Leader(FlightGuard),
    /// Another caller is already fetching; wait for its result
    Follower(watch::Receiver<Option<bool>>),
}

#[derive(Debug)]
pub struct SourceSlot {
    state: Mutex<SchedulerState>,
}

impl SourceSlot {
    /// New slot, due at `next_due_at`
    pub fn new(next_due_at: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                next_due_at,
                consecutive_failures: 0,
                flight: None,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Become the leader of a new fetch, or join the running one
    pub fn begin(self: &Arc<Self>) -> Flight {
        let mut state = self.lock();
        if let Some(rx) = &state.flight {
            return Flight::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        state.flight = Some(rx);
        Flight::Leader(FlightGuard {
            slot: Arc::clone(self),
            tx: Some(tx),
        })
    }

    /// Push the next attempt out to `next_due_at` without fetching
    pub fn defer_until(&self, next_due_at: DateTime<Utc>) {
        let mut state = self.lock();
        if !state.in_flight() {
            state.next_due_at = next_due_at;
        }
    }

    pub fn in_flight(&self) -> bool {
        self.lock().in_flight()
    }
}

/// Wait for a leader's result; a vanished leader counts as failure
pub async fn wait_for_result(mut rx: watch::Receiver<Option<bool>>) -> bool {
    match rx.wait_for(Option::is_some).await {
        Ok(value) => (*value).unwrap_or(false),
        Err(_) => false,
    }
}

/// Leadership of one in-flight fetch
///
/// [`FlightGuard::finish`] records the result, clears the in-flight flag and
/// wakes followers. Dropping an unfinished guard (cancelled fetch) clears the
/// flag and reports failure to followers, leaving `next_due_at` unchanged.
pub struct FlightGuard {
    slot: Arc<SourceSlot>,
    tx: Option<watch::Sender<Option<bool>>>,
}

impl FlightGuard {
    /// Complete the flight
    ///
    /// `consecutive_failures` is reset on success and incremented on
    /// failure; `schedule` maps the new failure count to the next due time.
    pub fn finish(
        mut self,
        success: bool,
        schedule: impl FnOnce(u32) -> DateTime<Utc>,
    ) -> u32 {
        let failures = {
            let mut state = self.slot.lock();
            state.consecutive_failures = if success {
                0
            } else {
                state.consecutive_failures.saturating_add(1)
            };
            state.next_due_at = schedule(state.consecutive_failures);
            state.flight = None;
            state.consecutive_failures
        };

        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(success));
        }
        failures
    }

    /// Complete the flight without fetching, because fresh data turned up
    ///
    /// Followers see success; the failure count is left alone.
    pub fn satisfied(mut self, next_due_at: DateTime<Utc>) {
        {
            let mut state = self.slot.lock();
            state.next_due_at = next_due_at;
            state.flight = None;
        }
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(true));
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        self.slot.lock().flight = None;
        tx.send_replace(Some(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_single_leader() {
        let slot = Arc::new(SourceSlot::new(Utc::now()));

        let leader = match slot.begin() {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => panic!("first caller must lead"),
        };
        assert!(slot.in_flight());

        let follower = match slot.begin() {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("second caller must follow"),
        };

        let waiter = tokio::spawn(wait_for_result(follower));
        let next = Utc::now() + Duration::seconds(60);
        assert_eq!(leader.finish(true, |_| next), 0);

        assert!(waiter.await.unwrap());
        assert!(!slot.in_flight());
        assert_eq!(slot.lock().next_due_at, next);
    }

    #[tokio::test]
    async fn test_failures_accumulate() {
        let slot = Arc::new(SourceSlot::new(Utc::now()));
        for expected in 1..=3 {
            let Flight::Leader(guard) = slot.begin() else {
                panic!("slot should be idle");
            };
            assert_eq!(guard.finish(false, |_| Utc::now()), expected);
        }

        let Flight::Leader(guard) = slot.begin() else {
            panic!("slot should be idle");
        };
        assert_eq!(guard.finish(true, |_| Utc::now()), 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_clears_flight() {
        let slot = Arc::new(SourceSlot::new(Utc::now()));
        let Flight::Leader(guard) = slot.begin() else {
            panic!("slot should be idle");
        };
        let Flight::Follower(rx) = slot.begin() else {
            panic!("slot should be busy");
        };

        drop(guard);
        assert!(!slot.in_flight());
        assert!(!wait_for_result(rx).await);
    }

    #[test]
    fn test_satisfied_flight_wakes_followers() {
        let slot = Arc::new(SourceSlot::new(Utc::now()));
        let Flight::Leader(guard) = slot.begin() else {
            panic!("slot should be idle");
        };
        let Flight::Follower(rx) = slot.begin() else {
            panic!("slot should be busy");
        };
        slot.lock().consecutive_failures = 2;

        let mut waiter = task::spawn(wait_for_result(rx));
        assert_pending!(waiter.poll());

        let next = Utc::now() + Duration::seconds(300);
        guard.satisfied(next);

        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), true);

        let state = slot.lock();
        assert!(!state.in_flight());
        assert_eq!(state.next_due_at, next);
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn test_follower_pending_until_leader_drops() {
        let slot = Arc::new(SourceSlot::new(Utc::now()));
        let Flight::Leader(guard) = slot.begin() else {
            panic!("slot should be idle");
        };
        let Flight::Follower(rx) = slot.begin() else {
            panic!("slot should be busy");
        };

        let mut waiter = task::spawn(wait_for_result(rx));
        assert_pending!(waiter.poll());

        drop(guard);
        assert_ready_eq!(waiter.poll(), false);
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let slot = Arc::new(SourceSlot::new(now));
        assert!(slot.lock().is_due(now));

        slot.defer_until(now + Duration::seconds(30));
        assert!(!slot.lock().is_due(now));
    }
}
