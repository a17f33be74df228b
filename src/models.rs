//! Core data structures and types
//!
//! This module defines the data model shared by the scheduler, the cache and
//! the health tracker: source configuration and status, normalized items, and
//! the per-attempt fetch outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::adapters::AdapterSpec;

// ============================================================================
// Source Status
// ============================================================================

/// Derived health status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceStatus {
    /// No errors in the tracked window
    Active,
    /// Error rate above zero but at most 50%
    Warning,
    /// Error rate above 50%
    Error,
    /// No fetch attempt has completed yet
    #[default]
    Inactive,
}

impl SourceStatus {
    /// Error-rate threshold above which a source is considered broken
    pub const ERROR_THRESHOLD: f64 = 0.5;

    /// Derive status from an error count over a number of attempts
    ///
    /// Zero attempts yields `Inactive`.
    pub fn from_error_rate(errors: u64, total: u64) -> Self {
        if total == 0 {
            return Self::Inactive;
        }

        let rate = errors as f64 / total as f64;
        if rate == 0.0 {
            Self::Active
        } else if rate <= Self::ERROR_THRESHOLD {
            Self::Warning
        } else {
            Self::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Inactive => "INACTIVE",
        }
    }

    /// All statuses, in severity order
    pub fn all() -> [Self; 4] {
        [Self::Active, Self::Warning, Self::Error, Self::Inactive]
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Source Configuration
// ============================================================================

/// Longest accepted `update_interval`, one year
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 365 * 24 * 3600;

fn default_update_interval() -> u64 {
    1800
}

fn default_cache_ttl() -> u64 {
    1800
}

fn default_enabled() -> bool {
    true
}

/// Static configuration of a single source, supplied by the registry loader
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Unique source identifier
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Baseline seconds between fetches
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Seconds a cached result is considered fresh
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Higher priority sources are dispatched first
    #[serde(default)]
    pub priority: i32,

    /// Requests must go through a proxy
    #[serde(default)]
    pub need_proxy: bool,

    /// Retry once without proxy if the proxy leg fails
    #[serde(default)]
    pub proxy_fallback: bool,

    /// Disabled sources are never picked up by the due-scan
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Which adapter family fetches this source, and how
    pub adapter: AdapterSpec,
}

impl SourceConfig {
    /// Create a source with default timing and the given adapter
    pub fn new(id: impl Into<String>, adapter: AdapterSpec) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            update_interval: default_update_interval(),
            cache_ttl: default_cache_ttl(),
            priority: 0,
            need_proxy: false,
            proxy_fallback: false,
            enabled: true,
            adapter,
        }
    }

    /// Set update interval and cache TTL in seconds
    pub fn with_timing(mut self, update_interval: u64, cache_ttl: u64) -> Self {
        self.update_interval = update_interval;
        self.cache_ttl = cache_ttl;
        self
    }

    /// Set dispatch priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Require a proxy, optionally allowing direct fallback
    pub fn with_proxy(mut self, fallback: bool) -> Self {
        self.need_proxy = true;
        self.proxy_fallback = fallback;
        self
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

// ============================================================================
// Source Health & Descriptor
// ============================================================================

/// Mutable health fields of a source, written only by the health tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceHealth {
    /// Derived status
    pub status: SourceStatus,

    /// Failures since the last success
    pub error_count: u64,

    /// Message of the most recent failure, cleared on success
    pub last_error: Option<String>,

    /// Time of the last successful fetch
    pub last_updated: Option<DateTime<Utc>>,

    /// All attempts ever recorded
    pub total_requests: u64,

    /// Successful attempts ever recorded
    pub success_count: u64,

    /// Fraction of successful attempts (0.0 - 1.0)
    pub success_rate: f64,

    /// Running average response time of successful attempts
    pub avg_response_ms: f64,

    /// Response time of the last successful attempt
    pub last_response_ms: Option<u64>,
}

/// Full read-only view of a source: configuration plus current health
#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub update_interval: u64,
    pub cache_ttl: u64,
    pub priority: i32,
    pub need_proxy: bool,
    pub proxy_fallback: bool,
    pub enabled: bool,
    pub status: SourceStatus,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub last_response_ms: Option<u64>,
}

impl SourceDescriptor {
    /// Combine static configuration with a health snapshot
    pub fn from_parts(config: &SourceConfig, health: SourceHealth) -> Self {
        Self {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            update_interval: config.update_interval,
            cache_ttl: config.cache_ttl,
            priority: config.priority,
            need_proxy: config.need_proxy,
            proxy_fallback: config.proxy_fallback,
            enabled: config.enabled,
            status: health.status,
            error_count: health.error_count,
            last_error: health.last_error,
            last_updated: health.last_updated,
            total_requests: health.total_requests,
            success_rate: health.success_rate,
            avg_response_ms: health.avg_response_ms,
            last_response_ms: health.last_response_ms,
        }
    }
}

// ============================================================================
// Item
// ============================================================================

/// One normalized unit of content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    /// Stable hash of source id and original identifier
    pub id: String,

    /// Source this item came from
    pub source_id: String,

    pub title: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Source-specific metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Item {
    /// Create an item; `original_id` is whatever identifies it upstream
    pub fn new(
        source_id: &str,
        original_id: &str,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: Self::make_id(source_id, original_id),
            source_id: source_id.to_string(),
            title: title.into(),
            url: url.into(),
            published_at: None,
            summary: None,
            content: None,
            image_url: None,
            extra: HashMap::new(),
        }
    }

    /// Stable item id: SHA-256 over `source_id:original_id`, hex encoded
    pub fn make_id(source_id: &str, original_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_id.as_bytes());
        hasher.update(b":");
        hasher.update(original_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary.filter(|s| !s.is_empty());
        self
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content.filter(|s| !s.is_empty());
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|s| !s.is_empty());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// Result of one fetch attempt, reported to the health tracker
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub source_id: String,
    pub success: bool,
    pub item_count: usize,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

impl FetchOutcome {
    /// Successful attempt
    pub fn success(source_id: &str, item_count: usize, response_time_ms: u64) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: true,
            item_count,
            response_time_ms,
            error_message: None,
        }
    }

    /// Failed attempt
    pub fn failure(source_id: &str, response_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: false,
            item_count: 0,
            response_time_ms,
            error_message: Some(error.into()),
        }
    }
}
