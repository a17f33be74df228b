//! Remote cache tier
//!
//! The cache manager only needs GET / SET EX / DEL / TTL / PING from the
//! remote store. [`RedisStore`] implements them on a deadpool connection pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};

use super::CacheConfig;

/// Minimal key/value protocol against a shared store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Raw value for `key`, if present
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl_secs`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// Remove `key`
    async fn del(&self, key: &str) -> Result<()>;

    /// Remaining lifetime of `key` in seconds, `None` if absent or persistent
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;

    /// Release connections; must be idempotent
    async fn close(&self);
}

/// Redis-backed remote tier
pub struct RedisStore {
    pool: Pool,
    closed: AtomicBool,
}

impl RedisStore {
    /// Create the pool without touching the network
    ///
    /// Connections are opened on first use, so a Redis that comes up later
    /// is picked up without rebuilding the store.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| anyhow::anyhow!("Failed to create pool builder: {e}"))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .context("Failed to create Redis connection pool")?;

        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Create the pool and verify connectivity
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let store = Self::new(config)?;

        tokio::time::timeout(config.remote_timeout(), store.ping())
            .await
            .context("Timed out connecting to Redis")??;

        Ok(store)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("Redis store is closed");
        }
        self.pool.get().await.context("Failed to get Redis connection")
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.context("Failed to get from cache")?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
            .await
            .context("Failed to set cache")?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .context("Failed to delete cache key")?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn.ttl(key).await.context("Failed to read key TTL")?;
        // -2: missing key, -1: no expiry
        Ok(u64::try_from(ttl).ok())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .context("Failed to ping Redis")?;
        if reply != "PONG" {
            anyhow::bail!("Unexpected PING reply: {reply}");
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close();
            tracing::info!("Redis connection pool closed");
        }
    }
}
