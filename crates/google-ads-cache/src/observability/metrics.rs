//! Prometheus metrics for the Google Ads cache

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

const METRIC_UPTIME: &str = "google_ads_cache_uptime_seconds";
const METRIC_INFO: &str = "google_ads_cache_info";

// Cache metrics
const METRIC_CACHE_HITS: &str = "google_ads_cache_hits_total";
const METRIC_CACHE_GRACE_HITS: &str = "google_ads_cache_grace_hits_total";
const METRIC_CACHE_MISSES: &str = "google_ads_cache_misses_total";
const METRIC_CACHE_WRITES: &str = "google_ads_cache_writes_total";
const METRIC_CACHE_ERRORS: &str = "google_ads_cache_errors_total";
const METRIC_CACHE_INVALIDATIONS: &str = "google_ads_cache_invalidations_total";
const METRIC_CACHE_INVALIDATED: &str = "google_ads_cache_invalidated_entries_total";
const METRIC_CACHE_CLEANED: &str = "google_ads_cache_cleaned_entries_total";

// Remote API metrics
const METRIC_REMOTE_FETCHES: &str = "google_ads_cache_remote_fetches_total";

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
    describe_gauge!(METRIC_UPTIME, "Process uptime in seconds");
    describe_gauge!(METRIC_INFO, "Build information (always 1)");

    describe_counter!(METRIC_CACHE_HITS, "Cache hits, grace hits included");
    describe_counter!(METRIC_CACHE_GRACE_HITS, "Cache hits served after expiry");
    describe_counter!(METRIC_CACHE_MISSES, "Cache misses");
    describe_counter!(METRIC_CACHE_WRITES, "Cache entries written");
    describe_counter!(METRIC_CACHE_ERRORS, "Cache operations that degraded to a miss");
    describe_counter!(METRIC_CACHE_INVALIDATIONS, "Scoped invalidations performed");
    describe_counter!(METRIC_CACHE_INVALIDATED, "Entries removed by invalidation");
    describe_counter!(METRIC_CACHE_CLEANED, "Expired entries removed by cleanup");
    describe_counter!(METRIC_REMOTE_FETCHES, "Calls made to the Google Ads API");

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

/// Record a cache hit.
pub fn record_cache_hit(entity_type: &str, grace: bool) {
    counter!(METRIC_CACHE_HITS, "entity_type" => entity_type.to_owned()).increment(1);
    if grace {
        counter!(METRIC_CACHE_GRACE_HITS, "entity_type" => entity_type.to_owned()).increment(1);
    }
}

/// Record a cache miss.
pub fn record_cache_miss(entity_type: &str) {
    counter!(METRIC_CACHE_MISSES, "entity_type" => entity_type.to_owned()).increment(1);
}

/// Record a cache write.
pub fn record_cache_write(entity_type: &str) {
    counter!(METRIC_CACHE_WRITES, "entity_type" => entity_type.to_owned()).increment(1);
}

/// Record a storage failure or timeout.
pub fn record_cache_error(operation: &str) {
    counter!(METRIC_CACHE_ERRORS, "operation" => operation.to_owned()).increment(1);
}

/// Record a scoped invalidation and the entries it removed.
pub fn record_cache_invalidation(scope: &str, removed: u64) {
    counter!(METRIC_CACHE_INVALIDATIONS, "scope" => scope.to_owned()).increment(1);
    counter!(METRIC_CACHE_INVALIDATED, "scope" => scope.to_owned()).increment(removed);
}

/// Record entries removed by expiration cleanup.
pub fn record_cache_cleanup(removed: u64) {
    counter!(METRIC_CACHE_CLEANED).increment(removed);
}

/// Record a call through to the remote API.
pub fn record_remote_fetch(entity_type: &str) {
    counter!(METRIC_REMOTE_FETCHES, "entity_type" => entity_type.to_owned()).increment(1);
}
