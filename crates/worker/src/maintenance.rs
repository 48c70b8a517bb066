//! Periodic library maintenance.
//!
//! Each cycle scans the library for first streams and upgrades, rechecks
//! streams that have not been verified recently and, when enabled, removes
//! duplicate streams. A failed step is logged and the cycle carries on.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use streamarr_core::config::ScannerConfig;
use streamarr_core::{CacheScanner, DuplicateDetector, DuplicateError, RecheckReport, ScanReport};

use crate::metrics::{encode_metrics, CYCLE_STEPS, LAST_CYCLE_DURATION, LAST_CYCLE_TIMESTAMP};

/// What one maintenance cycle did.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub scan: Option<ScanReport>,
    pub recheck: Option<RecheckReport>,
    /// Number of duplicate streams removed; `None` when not run or failed.
    pub duplicates_removed: Option<usize>,
}

pub struct MaintenanceWorker {
    scanner: CacheScanner,
    detector: DuplicateDetector,
    config: ScannerConfig,
    duplicate_threshold: f64,
}

impl MaintenanceWorker {
    pub fn new(
        scanner: CacheScanner,
        detector: DuplicateDetector,
        config: ScannerConfig,
        duplicate_threshold: f64,
    ) -> Self {
        Self {
            scanner,
            detector,
            config,
            duplicate_threshold,
        }
    }

    /// Run cycles until a shutdown signal arrives.
    ///
    /// The first cycle starts after `initial_delay_secs`; later cycles start
    /// `interval_secs` after the previous one finished.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            initial_delay_secs = self.config.initial_delay_secs,
            interval_secs = self.config.interval_secs,
            "Maintenance worker started"
        );

        let mut delay = Duration::from_secs(self.config.initial_delay_secs);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Maintenance worker received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let summary = self.run_cycle().await;
                    debug!(?summary, "Maintenance cycle finished");
                    debug!("Metrics:\n{}", encode_metrics());
                }
            }
            delay = Duration::from_secs(self.config.interval_secs.max(1));
        }

        info!("Maintenance worker stopped");
    }

    /// Run one scan, recheck and optional duplicate pass.
    pub async fn run_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        match self.scanner.scan_and_upgrade().await {
            Ok(report) => {
                record_step("scan", true);
                summary.scan = Some(report);
            }
            Err(e) => {
                record_step("scan", false);
                error!(error = %e, "Library scan failed");
            }
        }

        let cutoff = chrono::Utc::now() - chrono::Duration::hours(self.config.recheck_after_hours);
        match self.scanner.recheck_availability(cutoff).await {
            Ok(report) => {
                record_step("recheck", true);
                summary.recheck = Some(report);
            }
            Err(e) => {
                record_step("recheck", false);
                error!(error = %e, "Availability recheck failed");
            }
        }

        if self.config.auto_resolve_duplicates {
            match self.detector.auto_resolve(self.duplicate_threshold, false) {
                Ok(resolved) => {
                    record_step("duplicates", true);
                    summary.duplicates_removed = Some(resolved.len());
                }
                Err(DuplicateError::PartialResolution { resolved, source }) => {
                    record_step("duplicates", false);
                    warn!(
                        removed = resolved.len(),
                        error = %source,
                        "Duplicate resolution stopped early"
                    );
                }
                Err(e) => {
                    record_step("duplicates", false);
                    error!(error = %e, "Duplicate detection failed");
                }
            }
        }

        let elapsed = started.elapsed();
        LAST_CYCLE_DURATION.set(elapsed.as_secs_f64());
        LAST_CYCLE_TIMESTAMP.set(chrono::Utc::now().timestamp());
        info!(elapsed_ms = elapsed.as_millis() as u64, "Maintenance cycle complete");

        summary
    }
}

fn record_step(step: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    CYCLE_STEPS.with_label_values(&[step, result]).inc();
}
