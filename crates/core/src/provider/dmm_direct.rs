//! Direct DMM provider: queries cached-only addon sources and merges them by info hash.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{Clock, SystemClock, TtlCache};

use super::addon::{AddonKind, AddonProvider};
use super::{MediaRequest, ProviderError, StreamCandidate, StreamProvider};

/// Per-source request timeout.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider that treats every result of its sources as debrid-cached.
///
/// Results are deduplicated by info hash (entries without a hash are dropped)
/// and kept in a short-lived cache per title.
pub struct DmmDirectProvider {
    sources: Vec<Arc<dyn StreamProvider>>,
    cache: TtlCache<String, Vec<StreamCandidate>>,
}

impl DmmDirectProvider {
    pub fn new(sources: Vec<Arc<dyn StreamProvider>>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sources,
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    /// Torrentio and Comet with the debrid key embedded.
    pub fn with_debrid_key(debrid_key: &str, ttl: Duration) -> Result<Self, ProviderError> {
        let sources: Vec<Arc<dyn StreamProvider>> = [AddonKind::Torrentio, AddonKind::Comet]
            .into_iter()
            .map(|kind| {
                AddonProvider::new(kind, None, kind.default_options(debrid_key), SOURCE_TIMEOUT)
                    .map(|p| Arc::new(p) as Arc<dyn StreamProvider>)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self::new(sources, ttl, Arc::new(SystemClock)))
    }

    async fn fetch_all(&self, request: &MediaRequest) -> Vec<StreamCandidate> {
        let results = futures::future::join_all(
            self.sources
                .iter()
                .map(|source| async move { (source.name().to_string(), source.streams(request).await) }),
        )
        .await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::new();

        for (source, result) in results {
            match result {
                Ok(streams) => {
                    for mut stream in streams {
                        if stream.info_hash.is_empty() || !seen.insert(stream.info_hash.clone()) {
                            continue;
                        }
                        stream.cached = true;
                        merged.push(stream);
                    }
                }
                Err(e) => {
                    warn!(source = %source, request = %request, error = %e, "DMM source failed");
                }
            }
        }

        merged
    }
}

#[async_trait]
impl StreamProvider for DmmDirectProvider {
    fn name(&self) -> &str {
        "dmm_direct"
    }

    async fn streams(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError> {
        let key = request.cache_key();

        if let Some(streams) = self.cache.get(&key).await {
            debug!(request = %request, streams = streams.len(), "DMM cache hit");
            return Ok(streams);
        }

        let streams = self.fetch_all(request).await;
        info!(request = %request, streams = streams.len(), "DMM direct fetch complete");

        self.cache.insert(key, streams.clone()).await;
        Ok(streams)
    }
}
