//! Prometheus metrics for the scheduler and cache
//!
//! This module provides metrics tracking for:
//! - Scheduler: fetch attempts by outcome, fetch duration, in-flight fetches,
//!   proxy fallbacks, sources per health status
//! - Cache: hits per tier, misses, remote tier errors
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops. The `run`
//! command writes a final snapshot with [`write_metrics`] when asked to.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;

use crate::models::SourceStatus;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scheduler metrics
struct SchedulerMetrics {
    fetches: CounterVec,
    fetch_duration: HistogramVec,
    items_fetched: CounterVec,
    in_flight: Gauge,
    proxy_fallbacks: Counter,
    sources_by_status: GaugeVec,
}

/// Container for all cache metrics
struct CacheMetrics {
    hits: CounterVec,
    misses: Counter,
    remote_errors: CounterVec,
}

static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();

static CACHE_METRICS: OnceLock<CacheMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If metric registration fails, the error is
/// returned and subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = newsloom::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics initialization failed");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let scheduler = SchedulerMetrics {
        fetches: register_counter_vec!(
            "newsloom_fetches_total",
            "Adapter fetch attempts by adapter family and outcome",
            &["family", "outcome"]
        )?,
        fetch_duration: register_histogram_vec!(
            "newsloom_fetch_duration_seconds",
            "Adapter fetch duration in seconds",
            &["family"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        items_fetched: register_counter_vec!(
            "newsloom_items_fetched_total",
            "Items returned by successful fetches",
            &["family"]
        )?,
        in_flight: register_gauge!(
            "newsloom_fetches_in_flight",
            "Adapter fetches currently holding a concurrency permit"
        )?,
        proxy_fallbacks: register_counter!(
            "newsloom_proxy_fallbacks_total",
            "Attempts retried direct after the proxy route failed"
        )?,
        sources_by_status: register_gauge_vec!(
            "newsloom_sources",
            "Number of registered sources per health status",
            &["status"]
        )?,
    };

    let cache = CacheMetrics {
        hits: register_counter_vec!(
            "newsloom_cache_hits_total",
            "Cache hits by tier",
            &["tier"]
        )?,
        misses: register_counter!("newsloom_cache_misses_total", "Cache misses in both tiers")?,
        remote_errors: register_counter_vec!(
            "newsloom_cache_remote_errors_total",
            "Failed or timed out remote cache operations",
            &["operation"]
        )?,
    };

    SCHEDULER_METRICS
        .set(scheduler)
        .map_err(|_| "Scheduler metrics already initialized")?;
    CACHE_METRICS
        .set(cache)
        .map_err(|_| "Cache metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEDULER_METRICS.get().is_some() && CACHE_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write a snapshot of all metrics to `path` in Prometheus text format
pub fn write_metrics(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, gather_metrics()?)?;
    Ok(())
}

// ============================================================================
// Scheduler
// ============================================================================

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a fetch timer for an adapter family
pub fn start_fetch_timer(family: &str) -> MetricsTimer {
    match SCHEDULER_METRICS.get() {
        Some(m) => MetricsTimer::new(m.fetch_duration.with_label_values(&[family]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Record one fetch attempt (`success`, `failure` or `timeout`)
pub fn record_fetch(family: &str, outcome: &str, items: usize) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    m.fetches.with_label_values(&[family, outcome]).inc();
    if items > 0 {
        m.items_fetched
            .with_label_values(&[family])
            .inc_by(items as f64);
    }
}

/// Gauge guard counting a running fetch until dropped
pub struct InFlightGuard {
    gauge: Option<Gauge>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(gauge) = self.gauge.take() {
            gauge.dec();
        }
    }
}

/// Count a fetch as in flight for the lifetime of the returned guard
pub fn track_in_flight() -> InFlightGuard {
    let gauge = SCHEDULER_METRICS.get().map(|m| m.in_flight.clone());
    if let Some(gauge) = &gauge {
        gauge.inc();
    }
    InFlightGuard { gauge }
}

/// Record a direct retry after a failed proxy leg
pub fn record_proxy_fallback() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.proxy_fallbacks.inc();
    }
}

/// Publish per-status source counts
pub fn update_source_status_counts(counts: &[(SourceStatus, usize)]) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    for (status, count) in counts {
        m.sources_by_status
            .with_label_values(&[status.as_str()])
            .set(*count as f64);
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Record a cache hit in the given tier (`local` or `remote`)
pub fn record_cache_hit(tier: &str) {
    if let Some(m) = CACHE_METRICS.get() {
        m.hits.with_label_values(&[tier]).inc();
    }
}

pub fn record_cache_miss() {
    if let Some(m) = CACHE_METRICS.get() {
        m.misses.inc();
    }
}

/// Record a failed remote cache operation
pub fn record_cache_error(operation: &str) {
    if let Some(m) = CACHE_METRICS.get() {
        m.remote_errors.with_label_values(&[operation]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
