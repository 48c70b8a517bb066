//! Prometheus metrics for the maintenance worker.
//!
//! Worker-level cycle metrics are registered next to the core metrics
//! (providers, debrid, scanning) in a single registry.

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Maintenance cycles
// =============================================================================

/// Maintenance cycles by step and result.
pub static CYCLE_STEPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamarr_worker_cycle_steps_total",
            "Total maintenance cycle steps",
        ),
        &["step", "result"], // step: "scan", "recheck", "duplicates"; result: "success", "error"
    )
    .unwrap()
});

/// Wall time of the last completed cycle in seconds.
pub static LAST_CYCLE_DURATION: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "streamarr_worker_last_cycle_duration_seconds",
        "Duration of the last maintenance cycle in seconds",
    )
    .unwrap()
});

/// Unix time of the last completed cycle.
pub static LAST_CYCLE_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "streamarr_worker_last_cycle_timestamp_seconds",
        "Unix time the last maintenance cycle finished",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    registry.register(Box::new(CYCLE_STEPS.clone())).unwrap();
    registry
        .register(Box::new(LAST_CYCLE_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(LAST_CYCLE_TIMESTAMP.clone()))
        .unwrap();

    // Core metrics (providers, debrid, maintenance)
    for metric in streamarr_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encoding failed: {}\n", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
