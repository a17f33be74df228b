//! Adaptive scheduler
//!
//! Owns the source registry, per-source scheduling state, the cache manager
//! and the health tracker, and runs every fetch through the same path:
//!
//! 1. unknown source → error
//! 2. fresh cache entry and not forced → success without fetching
//! 3. join an already running fetch of the same source, if any
//! 4. wait for a global concurrency permit
//! 5. adapter fetch over the route(s) chosen by the proxy policy, under a deadline
//! 6. cache write on success, health report either way
//! 7. adapter close, in-flight cleared, next due time recomputed

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::backoff::{due_after, next_interval};
use super::error::{SchedulerError, SchedulerResult};
use super::state::{wait_for_result, Flight, SourceSlot};
use super::tier::FrequencyTier;
use crate::adapters::{AdapterFactory, AdapterGuard, Route};
use crate::cache::{source_key, CacheManager, CacheStats};
use crate::config::Config;
use crate::health::{HealthSummary, HealthTracker};
use crate::metrics;
use crate::models::{FetchOutcome, Item, SourceConfig, SourceDescriptor};
use crate::proxy::{ProxyFallback, ProxyProvider};
use crate::registry::{SourceLoader, SourceRegistry};
use crate::utils::error::FetchError;

/// Result of a batch of fetches
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Sources the batch selected
    pub selected: usize,
    /// Fetches that ended with fresh data (fetched or cached)
    pub succeeded: usize,
    /// Ids of sources whose fetch failed
    pub failed: Vec<String>,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// State that exists only after `initialize()`
struct Loaded {
    registry: SourceRegistry,
    slots: HashMap<String, Arc<SourceSlot>>,
    cache: CacheManager,
}

/// Coordinates fetching of all registered sources
pub struct AdaptiveScheduler {
    config: Config,
    loader: Arc<dyn SourceLoader>,
    factory: Arc<dyn AdapterFactory>,
    proxy: ProxyFallback,
    health: HealthTracker,
    limiter: Semaphore,
    fetch_timeout: Duration,
    tick_interval: Duration,
    /// Cache handed in before `initialize()`; connected from config otherwise
    pending_cache: Mutex<Option<CacheManager>>,
    init_lock: tokio::sync::Mutex<()>,
    loaded: OnceLock<Loaded>,
}

impl AdaptiveScheduler {
    /// Create a scheduler; nothing is loaded until [`initialize`](Self::initialize)
    pub fn new(
        config: Config,
        loader: Arc<dyn SourceLoader>,
        factory: Arc<dyn AdapterFactory>,
    ) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::config("config", format!("{e:#}")))?;

        Ok(Self {
            proxy: ProxyFallback::from_config(&config.proxy),
            health: HealthTracker::new(config.scheduler.health_window),
            limiter: Semaphore::new(config.scheduler.max_concurrent_fetches),
            fetch_timeout: config.fetch_timeout(),
            tick_interval: config.tick_interval(),
            pending_cache: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            loaded: OnceLock::new(),
            config,
            loader,
            factory,
        })
    }

    /// Use this cache manager instead of connecting one from config
    pub fn with_cache(self, cache: CacheManager) -> Self {
        *self
            .pending_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(cache);
        self
    }

    /// Replace the configured proxy endpoint source
    pub fn with_proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy = ProxyFallback::new(provider);
        self
    }

    /// Override the per-fetch deadline
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Override the due-scan period of [`run`](Self::run)
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the registry, open the cache and make every source due now
    pub async fn initialize(&self) -> SchedulerResult<()> {
        let _init = self.init_lock.lock().await;
        if self.loaded.get().is_some() {
            return Err(SchedulerError::AlreadyInitialized);
        }

        let registry = SourceRegistry::load(self.loader.as_ref()).await?;

        let pending = self
            .pending_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let cache = match pending {
            Some(cache) => cache,
            None => CacheManager::connect(self.config.cache.clone()).await,
        };

        let now = Utc::now();
        let slots = registry
            .iter()
            .map(|source| {
                self.health.register(&source.id);
                (source.id.clone(), Arc::new(SourceSlot::new(now)))
            })
            .collect();

        info!(
            sources = registry.len(),
            remote_cache = cache.is_remote_available(),
            max_concurrent = self.config.scheduler.max_concurrent_fetches,
            "Scheduler initialized"
        );

        let loaded = Loaded {
            registry,
            slots,
            cache,
        };
        if self.loaded.set(loaded).is_err() {
            return Err(SchedulerError::AlreadyInitialized);
        }

        self.publish_status_metrics();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.loaded.get().is_some()
    }

    fn loaded(&self) -> SchedulerResult<&Loaded> {
        self.loaded.get().ok_or(SchedulerError::NotInitialized)
    }

    /// Run due-scans every tick until `shutdown` resolves
    ///
    /// A scan already in progress when shutdown is requested runs to
    /// completion.
    pub async fn run<F>(&self, shutdown: F) -> SchedulerResult<()>
    where
        F: Future<Output = ()>,
    {
        self.loaded()?;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(tick_secs = self.tick_interval.as_secs_f64(), "Scheduler loop started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler loop");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.schedule_source_updates().await?;
                    if report.selected > 0 {
                        info!(
                            selected = report.selected,
                            succeeded = report.succeeded,
                            failed = report.failed_count(),
                            duration_ms = report.duration_ms,
                            "Due-scan completed"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Release the cache; safe to call more than once
    pub async fn close(&self) {
        if let Some(loaded) = self.loaded.get() {
            loaded.cache.close().await;
        }
        info!("Scheduler closed");
    }

    // ========================================================================
    // Registry access
    // ========================================================================

    /// Configuration plus current health of one source
    pub fn get_source(&self, id: &str) -> Option<SourceDescriptor> {
        let loaded = self.loaded.get()?;
        let source = loaded.registry.get(id)?;
        Some(self.describe(source))
    }

    /// All sources, by priority (desc) then id
    pub fn get_all_sources(&self) -> Vec<SourceDescriptor> {
        match self.loaded.get() {
            Some(loaded) => loaded.registry.iter().map(|s| self.describe(s)).collect(),
            None => Vec::new(),
        }
    }

    /// Static configuration of one source
    pub fn source_config(&self, id: &str) -> Option<Arc<SourceConfig>> {
        self.loaded.get()?.registry.get(id).cloned()
    }

    fn describe(&self, source: &SourceConfig) -> SourceDescriptor {
        SourceDescriptor::from_parts(source, self.health.snapshot(&source.id).unwrap_or_default())
    }

    /// When the source is next due, if known
    pub fn next_due(&self, id: &str) -> Option<DateTime<Utc>> {
        let loaded = self.loaded.get()?;
        loaded.slots.get(id).map(|slot| slot.lock().next_due_at)
    }

    /// Whether a fetch of the source is running right now
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.loaded
            .get()
            .and_then(|loaded| loaded.slots.get(id))
            .is_some_and(|slot| slot.in_flight())
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health.summary()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.loaded.get().map(|loaded| loaded.cache.stats())
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Fetch one source
    ///
    /// Returns `Ok(true)` when fresh data is available afterwards (fetched or
    /// already cached) and `Ok(false)` when the attempt failed; the failure
    /// detail is in [`SourceDescriptor::last_error`]. Errors are reserved for
    /// unknown sources and an uninitialized scheduler.
    pub async fn fetch_source(&self, id: &str, force: bool) -> SchedulerResult<bool> {
        let loaded = self.loaded()?;
        let source = loaded
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_source(id))?;
        let slot = loaded
            .slots
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_source(id))?;

        let key = source_key(id);

        if !force {
            if let Some(entry) = loaded.cache.get(&key).await {
                slot.defer_until(entry.expires_at());
                debug!(source_id = %id, items = entry.items.len(), "Fresh cache entry, fetch skipped");
                return Ok(true);
            }
        }

        let flight = match slot.begin() {
            Flight::Leader(flight) => flight,
            Flight::Follower(rx) => {
                debug!(source_id = %id, "Fetch already in flight, waiting for its result");
                return Ok(wait_for_result(rx).await);
            }
        };

        // A flight may have finished between the cache check above and
        // `begin`; its result is in the local tier by now
        if !force {
            if let Some(entry) = loaded.cache.peek_local(&key) {
                debug!(source_id = %id, "Source refreshed by a flight that just finished, fetch skipped");
                flight.satisfied(entry.expires_at());
                return Ok(true);
            }
        }

        // Never closed, so acquire cannot fail; the flight guard cleans up if it did
        let Ok(_permit) = self.limiter.acquire().await else {
            return Ok(false);
        };
        let _in_flight = metrics::track_in_flight();

        let started = Instant::now();
        let result = self
            .proxy
            .execute(&source, |route| self.attempt(&source, route))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let success = match result {
            Ok(items) => {
                let count = items.len();
                loaded.cache.set(&key, items, source.cache_ttl).await;
                self.health
                    .record(&FetchOutcome::success(id, count, elapsed_ms));
                info!(source_id = %id, items = count, elapsed_ms, "Source fetched");
                true
            }
            Err(e) => {
                self.health
                    .record(&FetchOutcome::failure(id, elapsed_ms, e.to_string()));
                warn!(source_id = %id, error = %e, elapsed_ms, "Source fetch failed");
                false
            }
        };

        let status = self.health.status(id).unwrap_or_default();
        let backoff = &self.config.scheduler.backoff;
        let base = source.update_interval;
        let failures = flight.finish(success, |failures| {
            let interval = next_interval(base, status, failures, backoff);
            due_after(Utc::now(), interval, backoff.jitter_ratio)
        });

        if !success && failures > 1 {
            debug!(
                source_id = %id,
                status = %status,
                consecutive_failures = failures,
                next_due = ?self.next_due(id),
                "Source backing off"
            );
        }

        self.publish_status_metrics();
        Ok(success)
    }

    /// One adapter lifecycle over one route: create, fetch under deadline, close
    async fn attempt(&self, source: &SourceConfig, route: Route) -> Result<Vec<Item>, FetchError> {
        let family = source.adapter.family().to_string();

        let adapter = match self.factory.create(source, &route) {
            Ok(adapter) => adapter,
            Err(e) => {
                metrics::record_fetch(&family, "failure", 0);
                return Err(e);
            }
        };
        let mut guard = AdapterGuard::new(&source.id, adapter);

        debug!(source_id = %source.id, route = %route, family = %family, "Invoking adapter");

        let timer = metrics::start_fetch_timer(&family);
        let result = match tokio::time::timeout(self.fetch_timeout, guard.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout.as_millis() as u64)),
        };
        drop(timer);

        if tokio::time::timeout(self.fetch_timeout, guard.close())
            .await
            .is_err()
        {
            warn!(source_id = %source.id, "Adapter close did not finish before the deadline");
        }

        match &result {
            Ok(items) => metrics::record_fetch(&family, "success", items.len()),
            Err(FetchError::Timeout(_)) => metrics::record_fetch(&family, "timeout", 0),
            Err(_) => metrics::record_fetch(&family, "failure", 0),
        }

        result
    }

    /// Fetch a set of sources, at most `max_concurrent_fetches` at a time
    async fn fetch_batch(&self, ids: Vec<String>, force: bool) -> ScanReport {
        let started = Instant::now();
        let selected = ids.len();
        let width = self.config.scheduler.max_concurrent_fetches.max(1);

        let results: Vec<(String, SchedulerResult<bool>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.fetch_source(&id, force).await;
                (id, result)
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let mut report = ScanReport {
            selected,
            ..ScanReport::default()
        };
        for (id, result) in results {
            match result {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.failed.push(id),
                Err(e) => {
                    warn!(source_id = %id, error = %e, "Fetch not started");
                    report.failed.push(id);
                }
            }
        }
        report.failed.sort();
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    fn select(&self, filter: impl Fn(&SourceConfig) -> bool) -> SchedulerResult<Vec<String>> {
        let loaded = self.loaded()?;
        Ok(loaded
            .registry
            .iter()
            .filter(|source| source.enabled && filter(source))
            .map(|source| source.id.clone())
            .collect())
    }

    /// Fetch every enabled source that is due and not in flight
    pub async fn schedule_source_updates(&self) -> SchedulerResult<ScanReport> {
        let loaded = self.loaded()?;
        let now = Utc::now();

        let due = self.select(|source| {
            loaded
                .slots
                .get(&source.id)
                .is_some_and(|slot| slot.lock().is_due(now))
        })?;

        if !due.is_empty() {
            debug!(count = due.len(), "Sources due");
        }
        Ok(self.fetch_batch(due, false).await)
    }

    /// Fetch every enabled source in `tier`
    pub async fn fetch_tier(&self, tier: FrequencyTier) -> SchedulerResult<ScanReport> {
        let scheduler = &self.config.scheduler;
        let ids = self.select(|source| {
            FrequencyTier::classify(source.update_interval, scheduler) == tier
        })?;

        info!(tier = %tier, count = ids.len(), "Running tier batch");
        Ok(self.fetch_batch(ids, false).await)
    }

    pub async fn fetch_high_frequency_sources(&self) -> SchedulerResult<ScanReport> {
        self.fetch_tier(FrequencyTier::High).await
    }

    pub async fn fetch_medium_frequency_sources(&self) -> SchedulerResult<ScanReport> {
        self.fetch_tier(FrequencyTier::Medium).await
    }

    pub async fn fetch_low_frequency_sources(&self) -> SchedulerResult<ScanReport> {
        self.fetch_tier(FrequencyTier::Low).await
    }

    /// Fetch every enabled source
    pub async fn fetch_all_sources(&self, force: bool) -> SchedulerResult<ScanReport> {
        let ids = self.select(|_| true)?;
        Ok(self.fetch_batch(ids, force).await)
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Cached items of one source, `None` if nothing fresh is cached
    pub async fn get_items(&self, id: &str) -> SchedulerResult<Option<Vec<Item>>> {
        let loaded = self.loaded()?;
        if !loaded.registry.contains(id) {
            return Err(SchedulerError::unknown_source(id));
        }
        Ok(loaded.cache.get(&source_key(id)).await.map(|entry| entry.items))
    }

    /// Merged feed of all cached items, newest first, without duplicates
    ///
    /// Items without a publication time sort after dated ones.
    pub async fn feed(&self, limit: usize) -> SchedulerResult<Vec<Item>> {
        let loaded = self.loaded()?;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for source in loaded.registry.iter() {
            if let Some(entry) = loaded.cache.get(&source_key(&source.id)).await {
                items.extend(
                    entry
                        .items
                        .into_iter()
                        .filter(|item| seen.insert(item.id.clone())),
                );
            }
        }

        items.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        items.truncate(limit);
        Ok(items)
    }

    fn publish_status_metrics(&self) {
        metrics::update_source_status_counts(&self.health.summary().as_pairs());
    }
}
