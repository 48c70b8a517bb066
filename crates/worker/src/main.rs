mod maintenance;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamarr_core::provider::ExclusionFilter;
use streamarr_core::{
    build_providers, load_config, Config, validate_config, CacheScanner, DebridService,
    DuplicateDetector, MultiProvider, RealDebridClient, SanitizedConfig, SortSpec,
    SqliteStreamStore, StreamStore,
};

use maintenance::MaintenanceWorker;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("streamarr-worker v{}", VERSION);

    // Determine config path
    let config_path = std::env::var("STREAMARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    // Stream store
    let store: Arc<dyn StreamStore> = Arc::new(
        SqliteStreamStore::new(&config.database.path).context("Failed to open stream store")?,
    );

    // Providers
    let providers = build_providers(&config.providers, &config.debrid)
        .context("Failed to create stream providers")?;
    let providers = Arc::new(MultiProvider::new(
        providers,
        Duration::from_secs(config.providers.timeout_secs as u64),
    ));
    info!(providers = ?providers.provider_names(), "Stream providers ready");

    // Debrid
    let debrid: Arc<dyn DebridService> = Arc::new(
        RealDebridClient::new(config.debrid.clone()).context("Failed to create debrid client")?,
    );
    if debrid.is_authenticated().await {
        info!(service = debrid.service_name(), "Debrid service authenticated");
    } else {
        warn!(
            service = debrid.service_name(),
            "Debrid authentication failed, cache checks will fail until the token is fixed"
        );
    }

    // Touch the registry so every metric is registered before the first cycle
    once_cell::sync::Lazy::force(&metrics::REGISTRY);

    if !config.scanner.enabled {
        info!("Cache scanner disabled, nothing to do");
        return Ok(());
    }

    let scanner = build_scanner(&config, Arc::clone(&store), providers, debrid);
    let detector = DuplicateDetector::new(Arc::clone(&store));
    let worker = MaintenanceWorker::new(
        scanner,
        detector,
        config.scanner.clone(),
        config.selection.duplicate_threshold,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    if let Err(e) = handle.await {
        warn!(error = %e, "Maintenance worker ended abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Scanner configured from the selection, filter, debrid and scanner sections.
fn build_scanner(
    config: &Config,
    store: Arc<dyn StreamStore>,
    providers: Arc<MultiProvider>,
    debrid: Arc<dyn DebridService>,
) -> CacheScanner {
    let filter = ExclusionFilter::from_filters(&config.filters);
    if let Some(filter) = &filter {
        info!(pattern = filter.as_str(), "Release exclusion filter enabled");
    }

    CacheScanner::new(store, providers, debrid)
        .with_exclusion_filter(filter)
        .with_max_quality(config.selection.max_quality)
        .with_sort(SortSpec::from(&config.selection))
        .with_min_upgrade_points(config.selection.min_upgrade_points)
        .with_recheck_interval(chrono::Duration::hours(config.scanner.recheck_after_hours))
        .with_batch_size(config.debrid.batch_size)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use streamarr_core::testing::{fixtures, MockDebridService, MockStreamProvider};
    use streamarr_core::StreamProvider;

    #[tokio::test]
    async fn test_scanner_honours_selection_config() {
        let mut config = Config::default();
        config.filters.enabled = true;
        config.filters.excluded_qualities = "CAM".to_string();
        config.selection.max_quality = 1080;

        let store = Arc::new(SqliteStreamStore::in_memory().unwrap());
        let provider = Arc::new(MockStreamProvider::new("mock"));
        let debrid = Arc::new(MockDebridService::new());
        let providers = Arc::new(MultiProvider::new(
            vec![provider.clone() as Arc<dyn StreamProvider>],
            Duration::from_secs(1),
        ));
        let scanner = build_scanner(&config, store.clone(), providers, debrid.clone());

        let id = store.upsert_media(&fixtures::movie("Movie", "tt1")).unwrap();
        provider
            .set_streams(vec![
                fixtures::titled_stream("Movie.2160p.REMUX", "uhd"),
                fixtures::titled_stream("Movie.1080p.BluRay.CAM", "cam"),
                fixtures::titled_stream("Movie.720p.WEB-DL", "web"),
            ])
            .await;
        debrid.set_cached(&["uhd", "cam", "web"]).await;

        let report = scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.cached, 1);
        let stored = store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "web");
    }
}
