//! newsloom - adaptive multi-source content ingestion
//!
//! Fetches content from many unreliable sources (RSS/Atom feeds, JSON APIs,
//! HTML pages, externally provided adapters) on a per-source cadence, keeps
//! the last good result of each in a two-tier cache, and exposes a uniform
//! feed of normalized items.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - Adaptive scheduler: due-scan, single-flight, concurrency bound
//! - [`cache`] - Two-tier (local + Redis) TTL cache
//! - [`adapters`] - Source adapter contract and built-in adapter families
//! - [`health`] - Per-source health statistics and status
//! - [`proxy`] - Proxy routing with direct fallback
//! - [`registry`] - Source registry and loaders
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Retry, text helpers and fetch errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use newsloom::adapters::AdapterProvider;
//! use newsloom::config::Config;
//! use newsloom::registry::FileSourceLoader;
//! use newsloom::scheduler::AdaptiveScheduler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = AdapterProvider::new(config.http.clone())?;
//!     let scheduler = AdaptiveScheduler::new(
//!         config,
//!         Arc::new(FileSourceLoader::new("sources.toml")),
//!         Arc::new(provider),
//!     )?;
//!
//!     scheduler.initialize().await?;
//!     scheduler.fetch_source("hn", false).await?;
//!     scheduler.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod proxy;
pub mod registry;
pub mod scheduler;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapters::{AdapterFactory, AdapterProvider, AdapterSpec, Route, SourceAdapter};
    pub use crate::cache::{CacheConfig, CacheManager};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, NewsloomErrorTrait, Result};
    pub use crate::models::{Item, SourceConfig, SourceDescriptor, SourceStatus};
    pub use crate::registry::{FileSourceLoader, SourceLoader, StaticSourceLoader};
    pub use crate::scheduler::{AdaptiveScheduler, FrequencyTier, ScanReport, SchedulerError};
    pub use crate::utils::error::FetchError;
}

// Direct re-exports for convenience
pub use models::{Item, SourceConfig, SourceDescriptor, SourceStatus};
