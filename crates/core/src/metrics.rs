//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Stream providers (requests, streams returned)
//! - Selection (best-stream outcomes, ranking)
//! - Debrid boundary (cache-check batches, hashes, URL resolution)
//! - Library maintenance (scans, duplicate resolution)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Providers
// =============================================================================

/// Provider requests by provider and status.
pub static PROVIDER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_provider_requests_total",
            "Total stream provider requests",
        ),
        &["provider", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Streams returned per provider.
pub static PROVIDER_STREAMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_provider_streams_total",
            "Total streams returned by providers",
        ),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Selection
// =============================================================================

/// Best-stream selections by outcome.
pub static STREAM_SELECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_stream_selections_total",
            "Total best-stream selections",
        ),
        &["outcome"], // "cached", "uncached", "none"
    )
    .unwrap()
});

/// Streams surviving the debrid cache filter per ranking request.
pub static CACHED_CANDIDATES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamarr_cached_candidates",
            "Number of debrid-cached candidates per ranking request",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Debrid
// =============================================================================

/// Cache-check batches by result.
pub static DEBRID_CHECK_BATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_debrid_check_batches_total",
            "Total debrid cache-check batches",
        ),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Hashes submitted for cache checks.
pub static DEBRID_HASHES_CHECKED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streamarr_debrid_hashes_checked_total",
        "Total hashes submitted to debrid cache checks",
    )
    .unwrap()
});

/// Stream URL resolutions by source.
pub static DEBRID_URL_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_debrid_url_resolutions_total",
            "Total stream URL resolutions",
        ),
        &["source"], // "cache", "service", "error"
    )
    .unwrap()
});

/// Debrid API request duration in seconds.
pub static DEBRID_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamarr_debrid_request_duration_seconds",
            "Duration of debrid API requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"],
    )
    .unwrap()
});

// =============================================================================
// Library maintenance
// =============================================================================

/// Cache scan items by outcome.
pub static SCAN_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streamarr_scan_items_total", "Total media items scanned"),
        &["outcome"], // "cached", "upgraded", "skipped", "error"
    )
    .unwrap()
});

/// Duplicate stream rows removed.
pub static DUPLICATES_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_duplicates_resolved_total",
            "Total duplicate streams resolved",
        ),
        &["match_type"], // "hash", "exact_title", "fuzzy_title"
    )
    .unwrap()
});

/// Returns all metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Providers
        Box::new(PROVIDER_REQUESTS.clone()),
        Box::new(PROVIDER_STREAMS.clone()),
        // Selection
        Box::new(STREAM_SELECTIONS.clone()),
        Box::new(CACHED_CANDIDATES.clone()),
        // Debrid
        Box::new(DEBRID_CHECK_BATCHES.clone()),
        Box::new(DEBRID_HASHES_CHECKED.clone()),
        Box::new(DEBRID_URL_RESOLUTIONS.clone()),
        Box::new(DEBRID_REQUEST_DURATION.clone()),
        // Maintenance
        Box::new(SCAN_ITEMS.clone()),
        Box::new(DUPLICATES_RESOLVED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        PROVIDER_REQUESTS
            .with_label_values(&["torrentio", "success"])
            .inc();
        assert!(!registry.gather().is_empty());
    }
}
