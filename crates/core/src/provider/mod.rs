//! Stream providers.
//!
//! A `StreamProvider` trait over heterogeneous upstream stream-list services,
//! concrete addon and DMM adapters, and a `MultiProvider` that fans out to all of
//! them and picks the best stream under release filters and sort options.

mod addon;
mod dmm_direct;
mod filter;
mod multi;
mod types;

pub use addon::{extract_quality_label, extract_seeders, AddonKind, AddonProvider};
pub use dmm_direct::DmmDirectProvider;
pub use filter::{
    decode_url, parse_quality_int, ExclusionFilter, SortField, SortPreference, SortSpec,
};
pub use multi::{select_best_stream, MultiProvider};
pub use types::*;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{DebridConfig, ProvidersConfig};

/// Provider names accepted in `providers.enabled`.
pub const KNOWN_PROVIDERS: &[&str] = &["torrentio", "comet", "mediafusion", "dmm_direct"];

/// Assemble the provider list from configuration, in configured order.
///
/// Unknown names are skipped. When nothing usable is enabled, Torrentio is used.
pub fn build_providers(
    providers: &ProvidersConfig,
    debrid: &DebridConfig,
) -> Result<Vec<Arc<dyn StreamProvider>>, ProviderError> {
    let timeout = Duration::from_secs(providers.timeout_secs as u64);
    let mut built: Vec<Arc<dyn StreamProvider>> = Vec::new();

    for name in &providers.enabled {
        let name = name.trim().to_lowercase();
        let provider: Arc<dyn StreamProvider> = match name.as_str() {
            "torrentio" => Arc::new(AddonProvider::from_config(
                AddonKind::Torrentio,
                &providers.torrentio,
                &debrid.api_key,
                timeout,
            )?),
            "comet" => Arc::new(AddonProvider::from_config(
                AddonKind::Comet,
                &providers.comet,
                &debrid.api_key,
                timeout,
            )?),
            "mediafusion" => Arc::new(AddonProvider::from_config(
                AddonKind::MediaFusion,
                &providers.mediafusion,
                &debrid.api_key,
                timeout,
            )?),
            "dmm_direct" => Arc::new(DmmDirectProvider::with_debrid_key(
                &debrid.api_key,
                Duration::from_secs(providers.dmm_cache_ttl_secs),
            )?),
            other => {
                warn!(provider = %other, "Skipping unknown provider");
                continue;
            }
        };
        built.push(provider);
    }

    if built.is_empty() {
        warn!("No providers enabled, falling back to torrentio");
        built.push(Arc::new(AddonProvider::from_config(
            AddonKind::Torrentio,
            &providers.torrentio,
            &debrid.api_key,
            timeout,
        )?));
    }

    info!(
        providers = ?built.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "Stream providers ready"
    );
    Ok(built)
}
