//! Two-tier cache for fetched source items
//!
//! This module keeps the last successful item list of every source:
//! - Local tier: in-process map, answers most reads without I/O
//! - Remote tier: Redis, shared by every process instance
//!
//! The remote tier is best-effort. Connection failures, timeouts and decode
//! errors are logged and treated as a miss (reads) or a partial success
//! (writes); they never reach the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use newsloom::cache::{source_key, CacheConfig, CacheManager};
//!
//! let cache = CacheManager::connect(CacheConfig::from_env()?).await;
//! cache.set(&source_key("hn"), items, 300).await;
//! let entry = cache.get(&source_key("hn")).await;
//! ```

mod local;
pub mod remote;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::metrics;
use crate::models::Item;
use local::LocalCache;
pub use remote::{RedisStore, RemoteStore};

/// Longest TTL honored for freshness arithmetic (10 years)
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Cache key of a source's item list
pub fn source_key(source_id: &str) -> String {
    format!("source:{source_id}")
}

// ============================================================================
// Configuration
// ============================================================================

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the Redis tier at all
    pub remote_enabled: bool,

    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Deadline for a single remote operation in milliseconds
    pub remote_timeout_ms: u64,

    /// Maximum number of entries held in the local tier
    pub local_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            remote_timeout_ms: 500,
            local_capacity: 1024,
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            remote_enabled: std::env::var("NEWSLOOM_CACHE_REMOTE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off"))
                .unwrap_or(defaults.remote_enabled),
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            remote_timeout_ms: std::env::var("NEWSLOOM_CACHE_REMOTE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.remote_timeout_ms),
            local_capacity: std::env::var("NEWSLOOM_CACHE_LOCAL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.local_capacity),
        })
    }

    /// Config for a cache that never talks to Redis
    pub fn local_only() -> Self {
        Self {
            remote_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            anyhow::bail!("cache local_capacity must be greater than 0");
        }
        if self.remote_enabled && self.pool_size == 0 {
            anyhow::bail!("cache pool_size must be greater than 0");
        }
        if self.remote_timeout_ms == 0 {
            anyhow::bail!("cache remote_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    /// Get remote operation deadline as Duration
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// Items of one successful fetch and when they were stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub items: Vec<Item>,
    pub stored_at: DateTime<Utc>,
    /// Freshness window in seconds
    pub ttl: u64,
}

impl CacheEntry {
    pub fn new(items: Vec<Item>, ttl: u64) -> Self {
        Self {
            items,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// When this entry stops being fresh
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.stored_at + chrono::Duration::seconds(self.ttl.min(MAX_TTL_SECS) as i64)
    }

    /// `now - stored_at < ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Cache statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads answered by the local tier
    pub local_hits: u64,
    /// Reads answered by the remote tier
    pub remote_hits: u64,
    /// Reads answered by neither tier
    pub misses: u64,
    /// Remote operations that failed or timed out
    pub remote_errors: u64,
    /// Successful `set` calls
    pub writes: u64,
    /// Entries currently held locally
    pub local_entries: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.remote_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
    writes: AtomicU64,
}

// ============================================================================
// Cache Manager
// ============================================================================

/// Two-tier TTL cache
pub struct CacheManager {
    local: Mutex<LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    config: CacheConfig,
    counters: Counters,
    closed: AtomicBool,
}

impl CacheManager {
    /// Create a manager over an explicit remote tier (or none)
    pub fn new(config: CacheConfig, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            local: Mutex::new(LocalCache::new(config.local_capacity)),
            remote,
            config,
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a manager, attaching Redis if enabled
    ///
    /// An unreachable Redis is not an error. The store stays attached and
    /// each remote operation degrades on its own until Redis answers. Only a
    /// malformed URL leaves the manager local-only.
    pub async fn connect(config: CacheConfig) -> Self {
        if !config.remote_enabled {
            return Self::new(config, None);
        }

        match RedisStore::new(&config) {
            Ok(store) => Self::attach(config, Arc::new(store)).await,
            Err(e) => {
                tracing::warn!(error = %e, "Redis cache misconfigured, continuing with local tier only");
                Self::new(config, None)
            }
        }
    }

    /// Create a manager over `remote`, logging whether it answers yet
    pub async fn attach(config: CacheConfig, remote: Arc<dyn RemoteStore>) -> Self {
        let manager = Self::new(config, Some(remote));
        if manager.health_check().await {
            tracing::info!(url = %manager.config.url, "Connected to remote cache");
        } else {
            tracing::warn!(
                url = %manager.config.url,
                "Remote cache not reachable yet, serving from local tier until it answers"
            );
        }
        manager
    }

    /// Check if a remote tier is attached and open
    pub fn is_remote_available(&self) -> bool {
        self.remote.is_some() && !self.closed.load(Ordering::SeqCst)
    }

    fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        if self.closed.load(Ordering::SeqCst) {
            None
        } else {
            self.remote.as_ref()
        }
    }

    fn with_local<R>(&self, f: impl FnOnce(&mut LocalCache) -> R) -> R {
        let mut guard = self
            .local
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn remote_failed(&self, operation: &'static str, key: &str, error: impl std::fmt::Display) {
        self.counters.remote_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_error(operation);
        tracing::warn!(key = %key, operation, error = %error, "Remote cache operation failed");
    }

    /// Fresh entry for `key` from the local tier, else the remote tier
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        if let Some(entry) = self.with_local(|local| local.get(key, now)) {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_hit("local");
            tracing::trace!(key = %key, "Local cache hit");
            return Some(entry);
        }

        if let Some(entry) = self.get_remote(key).await {
            let now = Utc::now();
            if entry.is_fresh_at(now) {
                self.with_local(|local| local.insert(key.to_string(), entry.clone(), now));
                self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit("remote");
                tracing::debug!(key = %key, "Remote cache hit");
                return Some(entry);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
        tracing::trace!(key = %key, "Cache miss");
        None
    }

    /// Fresh entry for `key` from the local tier only, without counting a hit or miss
    pub fn peek_local(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        self.with_local(|local| local.get(key, now))
    }

    async fn get_remote(&self, key: &str) -> Option<CacheEntry> {
        let remote = self.remote()?;

        match tokio::time::timeout(self.config.remote_timeout(), remote.get(key)).await {
            Ok(Ok(Some(bytes))) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    self.remote_failed("decode", key, e);
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                self.remote_failed("get", key, e);
                None
            }
            Err(_) => {
                self.remote_failed("get", key, "timed out");
                None
            }
        }
    }

    /// Store `items` under `key` in both tiers
    pub async fn set(&self, key: &str, items: Vec<Item>, ttl: u64) {
        let entry = CacheEntry::new(items, ttl);
        let now = entry.stored_at;

        let encoded = match self.remote() {
            Some(_) => match serde_json::to_vec(&entry) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    self.remote_failed("encode", key, e);
                    None
                }
            },
            None => None,
        };

        self.with_local(|local| local.insert(key.to_string(), entry, now));
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        if let (Some(remote), Some(bytes)) = (self.remote(), encoded) {
            match tokio::time::timeout(self.config.remote_timeout(), remote.set_ex(key, bytes, ttl))
                .await
            {
                Ok(Ok(())) => tracing::trace!(key = %key, ttl, "Cached in remote tier"),
                Ok(Err(e)) => self.remote_failed("set", key, e),
                Err(_) => self.remote_failed("set", key, "timed out"),
            }
        }
    }

    /// Remove `key` from both tiers
    pub async fn delete(&self, key: &str) {
        self.with_local(|local| local.remove(key));

        if let Some(remote) = self.remote() {
            match tokio::time::timeout(self.config.remote_timeout(), remote.del(key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.remote_failed("del", key, e),
                Err(_) => self.remote_failed("del", key, "timed out"),
            }
        }
    }

    /// Remaining remote lifetime of `key` in seconds
    pub async fn remote_ttl(&self, key: &str) -> Option<u64> {
        let remote = self.remote()?;
        match tokio::time::timeout(self.config.remote_timeout(), remote.ttl(key)).await {
            Ok(Ok(ttl)) => ttl,
            Ok(Err(e)) => {
                self.remote_failed("ttl", key, e);
                None
            }
            Err(_) => {
                self.remote_failed("ttl", key, "timed out");
                None
            }
        }
    }

    /// Drop every local entry; the remote tier is left alone
    pub fn clear_local(&self) {
        self.with_local(LocalCache::clear);
    }

    /// Check if the remote tier answers
    pub async fn health_check(&self) -> bool {
        match self.remote() {
            Some(remote) => matches!(
                tokio::time::timeout(self.config.remote_timeout(), remote.ping()).await,
                Ok(Ok(()))
            ),
            None => false,
        }
    }

    /// Release the remote tier; later calls are no-ops
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(remote) = &self.remote {
            remote.close().await;
        }
        tracing::debug!("Cache manager closed");
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            remote_errors: self.counters.remote_errors.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            local_entries: self.with_local(|local| local.len()),
        }
    }

    /// Get config reference
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
