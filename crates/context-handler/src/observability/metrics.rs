//! Prometheus metrics for the context handler

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::cache::CacheStats;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

// Server metrics
const METRIC_UPTIME: &str = "context_handler_uptime_seconds";
const METRIC_INFO: &str = "context_handler_info";

// Pipeline metrics
const METRIC_STRATEGY_OUTCOMES: &str = "context_handler_strategy_outcomes_total";
const METRIC_TOKEN_ROTATIONS: &str = "context_handler_token_rotations_total";
const METRIC_LAST_SEEN_UPDATES: &str = "context_handler_last_seen_updates_total";

// Cache metrics
const METRIC_CACHE_HITS: &str = "context_handler_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "context_handler_cache_misses_total";
const METRIC_CACHE_EVICTIONS: &str = "context_handler_cache_evictions_total";
const METRIC_CACHE_ENTRIES: &str = "context_handler_cache_entries";
const METRIC_CACHE_SIZE: &str = "context_handler_cache_size_bytes";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Server uptime in seconds");
    describe_gauge!(METRIC_INFO, "Server information (always 1)");

    describe_counter!(
        METRIC_STRATEGY_OUTCOMES,
        "Requests claimed or rejected per authentication strategy"
    );
    describe_counter!(METRIC_TOKEN_ROTATIONS, "Session token rotation attempts by result");
    describe_counter!(METRIC_LAST_SEEN_UPDATES, "Last-seen updates by result");

    describe_counter!(METRIC_CACHE_HITS, "Total cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Total cache misses");
    describe_counter!(METRIC_CACHE_EVICTIONS, "Stale proxy cache entries evicted");
    describe_gauge!(METRIC_CACHE_ENTRIES, "Live entries in the proxy cache");
    describe_gauge!(METRIC_CACHE_SIZE, "Bytes held by the proxy cache");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record which strategy ended the chain and how.
pub fn record_strategy_outcome(strategy: &'static str, outcome: &'static str) {
    counter!(
        METRIC_STRATEGY_OUTCOMES,
        "strategy" => strategy,
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a session token rotation attempt (`rotated`, `skipped` or `failed`).
pub fn record_token_rotation(result: &'static str) {
    counter!(METRIC_TOKEN_ROTATIONS, "result" => result).increment(1);
}

pub fn record_last_seen_update(success: bool) {
    let result = if success { "success" } else { "error" };
    counter!(METRIC_LAST_SEEN_UPDATES, "result" => result).increment(1);
}

/// Record a cache lookup.
pub fn record_cache_lookup(namespace: &str, hit: bool) {
    if hit {
        counter!(METRIC_CACHE_HITS, "namespace" => namespace.to_owned()).increment(1);
    } else {
        counter!(METRIC_CACHE_MISSES, "namespace" => namespace.to_owned()).increment(1);
    }
}

/// Record a cache eviction.
pub fn record_cache_eviction(namespace: &str) {
    counter!(METRIC_CACHE_EVICTIONS, "namespace" => namespace.to_owned()).increment(1);
}

/// Publish a cache snapshot; backends without size data are skipped.
#[allow(clippy::cast_precision_loss)]
pub fn record_cache_stats(stats: &CacheStats) {
    if let Some(entries) = stats.entry_count {
        gauge!(METRIC_CACHE_ENTRIES).set(entries as f64);
    }
    if let Some(size) = stats.size_bytes {
        gauge!(METRIC_CACHE_SIZE).set(size as f64);
    }
}
