use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub debrid: DebridConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub filters: ReleaseFilters,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// Stream provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Providers to query, in order ("torrentio", "comet", "mediafusion", "dmm_direct").
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<String>,
    /// Per-request timeout in seconds (default: 15)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub torrentio: AddonConfig,
    #[serde(default)]
    pub comet: AddonConfig,
    #[serde(default)]
    pub mediafusion: AddonConfig,
    /// Lifetime of DMM direct cached responses in seconds (default: 300)
    #[serde(default = "default_dmm_cache_ttl")]
    pub dmm_cache_ttl_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_providers(),
            timeout_secs: default_provider_timeout(),
            torrentio: AddonConfig::default(),
            comet: AddonConfig::default(),
            mediafusion: AddonConfig::default(),
            dmm_cache_ttl_secs: default_dmm_cache_ttl(),
        }
    }
}

fn default_enabled_providers() -> Vec<String> {
    vec!["torrentio".to_string()]
}

fn default_provider_timeout() -> u32 {
    15
}

fn default_dmm_cache_ttl() -> u64 {
    300
}

/// Overrides for a single addon-protocol provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AddonConfig {
    /// Base URL; the provider's public instance when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Path segment carrying addon options; derived from the debrid key when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

/// Debrid service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DebridConfig {
    /// Real-Debrid API token
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_debrid_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_debrid_timeout")]
    pub timeout_secs: u32,
    /// Hashes per instant-availability request (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts for rate-limited requests (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Requests per minute allowed by the local limiter (default: 250)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
    /// Lifetime of resolved stream URLs in seconds (default: 24h)
    #[serde(default = "default_url_cache_ttl")]
    pub url_cache_ttl_secs: u64,
}

impl Default for DebridConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_debrid_url(),
            timeout_secs: default_debrid_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            rate_limit_rpm: default_rate_limit_rpm(),
            url_cache_ttl_secs: default_url_cache_ttl(),
        }
    }
}

fn default_debrid_url() -> String {
    "https://api.real-debrid.com/rest/1.0".to_string()
}

fn default_debrid_timeout() -> u32 {
    30
}

fn default_batch_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_rpm() -> u32 {
    250
}

fn default_url_cache_ttl() -> u64 {
    24 * 60 * 60
}

/// Stream selection policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Highest resolution accepted, as a line count (default: 2160)
    #[serde(default = "default_max_quality")]
    pub max_quality: u32,
    /// Comma-separated sort fields (default: "quality,size,seeders")
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    /// "best", "smallest" or "lowest" (default: "best")
    #[serde(default = "default_sort_prefer")]
    pub sort_prefer: String,
    /// Score gain required before replacing a cached stream (default: 10)
    #[serde(default = "default_min_upgrade_points")]
    pub min_upgrade_points: i32,
    /// Title similarity treated as a duplicate (default: 0.85)
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_quality: default_max_quality(),
            sort_order: default_sort_order(),
            sort_prefer: default_sort_prefer(),
            min_upgrade_points: default_min_upgrade_points(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

fn default_max_quality() -> u32 {
    2160
}

pub(crate) fn default_sort_order() -> String {
    "quality,size,seeders".to_string()
}

pub(crate) fn default_sort_prefer() -> String {
    "best".to_string()
}

fn default_min_upgrade_points() -> i32 {
    10
}

fn default_duplicate_threshold() -> f64 {
    0.85
}

/// Release exclusion patterns.
///
/// Each field is a regex alternation fragment such as `"REMUX|HDR|CAM"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseFilters {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub excluded_qualities: String,
    #[serde(default)]
    pub excluded_groups: String,
    #[serde(default)]
    pub excluded_languages: String,
    #[serde(default)]
    pub excluded_custom: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("streamarr.db")
}

/// Background cache scanner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scanner_enabled")]
    pub enabled: bool,
    /// Seconds between scans (default: 6h)
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,
    /// Seconds to wait before the first scan (default: 60)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Recheck streams not checked for this many hours (default: 24)
    #[serde(default = "default_recheck_age")]
    pub recheck_after_hours: i64,
    /// Remove duplicate streams after each scan (default: false)
    #[serde(default)]
    pub auto_resolve_duplicates: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scanner_enabled(),
            interval_secs: default_scan_interval(),
            initial_delay_secs: default_initial_delay(),
            recheck_after_hours: default_recheck_age(),
            auto_resolve_duplicates: false,
        }
    }
}

fn default_scanner_enabled() -> bool {
    true
}

fn default_scan_interval() -> u64 {
    6 * 60 * 60
}

fn default_initial_delay() -> u64 {
    60
}

fn default_recheck_age() -> i64 {
    24
}

/// Sanitized config for display and logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub providers: ProvidersConfig,
    pub debrid: SanitizedDebridConfig,
    pub selection: SelectionConfig,
    pub filters: ReleaseFilters,
    pub database: DatabaseConfig,
    pub scanner: ScannerConfig,
}

/// Sanitized debrid config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDebridConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
    pub batch_size: usize,
    pub max_retries: u32,
    pub rate_limit_rpm: u32,
    pub url_cache_ttl_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let mut providers = config.providers.clone();
        // Addon options embed the debrid key
        for addon in [
            &mut providers.torrentio,
            &mut providers.comet,
            &mut providers.mediafusion,
        ] {
            if addon.options.is_some() {
                addon.options = Some("<redacted>".to_string());
            }
        }

        Self {
            providers,
            debrid: SanitizedDebridConfig {
                base_url: config.debrid.base_url.clone(),
                api_key_configured: !config.debrid.api_key.is_empty(),
                timeout_secs: config.debrid.timeout_secs,
                batch_size: config.debrid.batch_size,
                max_retries: config.debrid.max_retries,
                rate_limit_rpm: config.debrid.rate_limit_rpm,
                url_cache_ttl_secs: config.debrid.url_cache_ttl_secs,
            },
            selection: config.selection.clone(),
            filters: config.filters.clone(),
            database: config.database.clone(),
            scanner: config.scanner.clone(),
        }
    }
}
