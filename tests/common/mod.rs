//! Common test utilities
//!
//! A scriptable adapter family (`mock`) with counters for fetches, closes
//! and concurrency, plus in-memory and broken remote cache tiers.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use newsloom::adapters::{AdapterFactory, AdapterProvider, AdapterSpec, Route, SourceAdapter};
use newsloom::cache::{CacheConfig, CacheManager, RemoteStore};
use newsloom::config::{Config, HttpConfig};
use newsloom::models::{Item, SourceConfig};
use newsloom::registry::StaticSourceLoader;
use newsloom::scheduler::AdaptiveScheduler;
use newsloom::utils::error::FetchError;

// ============================================================================
// Mock adapter family
// ============================================================================

/// What a mock adapter does when fetched
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return `items` items after `delay`
    Succeed { items: usize, delay: Duration },
    /// Fail with the given message
    Fail(String),
    /// Never finish
    Hang,
    /// Fail over a proxy route, succeed directly
    FailViaProxy,
}

impl Default for Behavior {
    fn default() -> Self {
        Self::Succeed {
            items: 3,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
pub struct MockState {
    behaviors: Mutex<HashMap<String, Behavior>>,
    pub creates: AtomicUsize,
    pub fetches: AtomicUsize,
    pub closes: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    routes: Mutex<Vec<(String, Route)>>,
}

/// Factory for the `mock` family; clones share state
#[derive(Clone, Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, source_id: &str, behavior: Behavior) {
        self.state
            .behaviors
            .lock()
            .unwrap()
            .insert(source_id.to_string(), behavior);
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Routes adapters were created for, per source
    pub fn routes(&self, source_id: &str) -> Vec<Route> {
        self.state
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == source_id)
            .map(|(_, route)| route.clone())
            .collect()
    }
}

impl AdapterFactory for MockFactory {
    fn create(
        &self,
        source: &SourceConfig,
        route: &Route,
    ) -> Result<Box<dyn SourceAdapter>, FetchError> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        self.state
            .routes
            .lock()
            .unwrap()
            .push((source.id.clone(), route.clone()));

        let behavior = self
            .state
            .behaviors
            .lock()
            .unwrap()
            .get(&source.id)
            .cloned()
            .unwrap_or_default();

        Ok(Box::new(MockAdapter {
            source_id: source.id.clone(),
            route: route.clone(),
            behavior,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockAdapter {
    source_id: String,
    route: Route,
    behavior: Behavior,
    state: Arc<MockState>,
}

/// Decrements the active counter even if the fetch is cancelled
struct ActiveGuard(Arc<MockState>);

impl ActiveGuard {
    fn enter(state: &Arc<MockState>) -> Self {
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(state))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    async fn fetch(&mut self) -> Result<Vec<Item>, FetchError> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveGuard::enter(&self.state);

        match &self.behavior {
            Behavior::Succeed { items, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(make_items(&self.source_id, *items))
            }
            Behavior::Fail(msg) => Err(FetchError::other(msg.clone())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behavior::FailViaProxy => match self.route {
                Route::Proxy(_) => Err(FetchError::Proxy("connection refused".into())),
                Route::Direct => Ok(make_items(&self.source_id, 1)),
            },
        }
    }

    async fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Items with distinct, decreasing publication times
pub fn make_items(source_id: &str, n: usize) -> Vec<Item> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            Item::new(
                source_id,
                &i.to_string(),
                format!("{source_id} item {i}"),
                format!("https://example.com/{source_id}/{i}"),
            )
            .with_published_at(Some(now - ChronoDuration::minutes(i as i64)))
        })
        .collect()
}

// ============================================================================
// Remote cache fakes
// ============================================================================

/// Shared in-memory remote tier
#[derive(Default)]
pub struct MemoryRemote {
    data: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
    pub sets: AtomicUsize,
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.data.lock().await.get(key).map(|_| 60))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Remote tier that refuses every operation
#[derive(Default)]
pub struct FailingRemote;

#[async_trait]
impl RemoteStore for FailingRemote {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        anyhow::bail!("connection refused")
    }

    async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn del(&self, _key: &str) -> Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn ttl(&self, _key: &str) -> Result<Option<u64>> {
        anyhow::bail!("connection refused")
    }

    async fn ping(&self) -> Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn close(&self) {}
}

/// Remote tier that never answers
#[derive(Default)]
pub struct HangingRemote;

#[async_trait]
impl RemoteStore for HangingRemote {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        std::future::pending().await
    }

    async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        std::future::pending().await
    }

    async fn del(&self, _key: &str) -> Result<()> {
        std::future::pending().await
    }

    async fn ttl(&self, _key: &str) -> Result<Option<u64>> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<()> {
        std::future::pending().await
    }

    async fn close(&self) {}
}

/// In-memory remote tier that can be taken down and brought back
#[derive(Default)]
pub struct FlakyRemote {
    inner: MemoryRemote,
    down: AtomicBool,
}

impl FlakyRemote {
    pub fn unreachable() -> Self {
        let remote = Self::default();
        remote.set_down(true);
        remote
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn sets(&self) -> usize {
        self.inner.sets.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.del(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn close(&self) {}
}

/// Remote tier whose reads answer only after `delay`
///
/// The value is read before the delay, so a reply can be stale by the time
/// it arrives.
pub struct SlowRemote {
    inner: MemoryRemote,
    delay: Duration,
}

impl SlowRemote {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRemote::default(),
            delay,
        }
    }
}

#[async_trait]
impl RemoteStore for SlowRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.inner.get(key).await?;
        tokio::time::sleep(self.delay).await;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.inner.del(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.inner.ttl(key).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

// ============================================================================
// Builders
// ============================================================================

/// Source fetched by the `mock` family
pub fn mock_source(id: &str, interval: u64) -> SourceConfig {
    SourceConfig::new(
        id,
        AdapterSpec::Custom {
            family: "mock".to_string(),
            options: HashMap::new(),
        },
    )
    .with_timing(interval, interval)
}

pub fn local_cache() -> CacheManager {
    CacheManager::new(CacheConfig::local_only(), None)
}

/// Cache config with a short remote deadline
pub fn remote_cache_config() -> CacheConfig {
    CacheConfig {
        remote_timeout_ms: 100,
        ..CacheConfig::default()
    }
}

/// Provider with the `mock` family registered
pub fn provider(factory: &MockFactory) -> AdapterProvider {
    AdapterProvider::new(HttpConfig::default())
        .unwrap()
        .with_family("mock", Arc::new(factory.clone()))
}

/// Uninitialized scheduler over `sources`
pub fn scheduler(
    sources: Vec<SourceConfig>,
    factory: &MockFactory,
    cache: CacheManager,
    configure: impl FnOnce(&mut Config),
) -> AdaptiveScheduler {
    let mut config = Config::default();
    configure(&mut config);

    AdaptiveScheduler::new(
        config,
        Arc::new(StaticSourceLoader::new(sources)),
        Arc::new(provider(factory)),
    )
    .unwrap()
    .with_cache(cache)
}

/// Initialized scheduler with a local-only cache and default config
pub async fn ready_scheduler(sources: Vec<SourceConfig>, factory: &MockFactory) -> AdaptiveScheduler {
    let scheduler = scheduler(sources, factory, local_cache(), |_| {});
    scheduler.initialize().await.unwrap();
    scheduler
}
