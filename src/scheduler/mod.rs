//! Adaptive source scheduling
//!
//! This module decides when each source is fetched and makes sure every
//! fetch goes through the cache, the concurrency limit, the proxy policy and
//! the health tracker.
//!
//! # Overview
//!
//! ```text
//!   timer / CLI / caller
//!          │ fetch_source, schedule_source_updates, tier batches
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   AdaptiveScheduler                     │
//! │                                                         │
//! │  cache fresh? ──yes──► done                             │
//! │       │ no / forced                                     │
//! │       ▼                                                 │
//! │  single-flight ──busy──► wait for running fetch         │
//! │       │                                                 │
//! │       ▼                                                 │
//! │  semaphore permit ──► ProxyFallback ──► AdapterGuard    │
//! │                                           │             │
//! │       ┌───────────────────────────────────┘             │
//! │       ▼                                                 │
//! │  cache write (success) + HealthTracker + next due       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one fetch per source is in flight; duplicate callers receive
//!   the running fetch's result.
//! - At most `max_concurrent_fetches` adapter calls run at once; further
//!   callers queue.
//! - Every adapter is closed exactly once, including on timeout and when
//!   the calling future is dropped.
//! - A failed fetch never writes the cache, so the last good items stay
//!   available.
//!
//! # Next-due times
//!
//! | Status                     | Next attempt after                          |
//! |----------------------------|---------------------------------------------|
//! | ACTIVE, WARNING, INACTIVE  | `update_interval`                           |
//! | ERROR                      | `update_interval * multiplier^(n-1)`, capped |
//! | served from cache          | expiry of the cache entry                   |
//!
//! # Modules
//!
//! - [`adaptive`] - [`AdaptiveScheduler`] and batch reports
//! - [`tier`] - frequency tiers for batch triggers
//! - [`error`] - scheduler errors

pub mod adaptive;
mod backoff;
pub mod error;
mod state;
pub mod tier;

pub use adaptive::{AdaptiveScheduler, ScanReport};
pub use backoff::next_interval;
pub use error::{SchedulerError, SchedulerResult};
pub use tier::FrequencyTier;
