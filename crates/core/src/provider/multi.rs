//! Fan-out over every configured provider plus best-stream selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics;

use super::filter::{parse_quality_int, ExclusionFilter, SortSpec};
use super::{MediaRequest, ProviderError, StreamCandidate, StreamProvider, StreamSelection};

/// Aggregates streams from a list of providers.
///
/// Providers are queried concurrently, each bounded by its own timeout. Results are
/// concatenated in provider order without cross-provider deduplication.
pub struct MultiProvider {
    providers: Vec<Arc<dyn StreamProvider>>,
    timeout: Duration,
}

impl MultiProvider {
    pub fn new(providers: Vec<Arc<dyn StreamProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Union of every provider's streams.
    ///
    /// Fails only when every provider failed; a mix of failures and empty
    /// answers is an empty success.
    pub async fn streams(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError> {
        let start = Instant::now();

        let futures = self.providers.iter().map(|provider| async move {
            let name = provider.name().to_string();
            let result = match tokio::time::timeout(self.timeout, provider.streams(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            (name, result)
        });
        let results = futures::future::join_all(futures).await;

        let mut all_streams = Vec::new();
        let mut errors: HashMap<String, String> = HashMap::new();

        for (name, result) in results {
            match result {
                Ok(mut streams) => {
                    debug!(provider = %name, streams = streams.len(), "Provider returned streams");
                    metrics::PROVIDER_REQUESTS
                        .with_label_values(&[name.as_str(), "success"])
                        .inc();
                    metrics::PROVIDER_STREAMS
                        .with_label_values(&[name.as_str()])
                        .inc_by(streams.len() as u64);
                    all_streams.append(&mut streams);
                }
                Err(e) => {
                    warn!(provider = %name, request = %request, error = %e, "Provider failed");
                    metrics::PROVIDER_REQUESTS
                        .with_label_values(&[name.as_str(), "error"])
                        .inc();
                    errors.insert(name, e.to_string());
                }
            }
        }

        if !self.providers.is_empty() && errors.len() == self.providers.len() {
            return Err(ProviderError::AllProvidersFailed(errors));
        }

        info!(
            request = %request,
            streams = all_streams.len(),
            failed = errors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Aggregated provider streams"
        );

        Ok(all_streams)
    }

    pub async fn movie_streams(&self, imdb_id: &str) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.streams(&MediaRequest::movie(imdb_id)).await
    }

    pub async fn series_streams(
        &self,
        imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.streams(&MediaRequest::episode(imdb_id, season, episode))
            .await
    }

    /// Fetch and pick the best stream for a title.
    pub async fn best_stream(
        &self,
        request: &MediaRequest,
        max_quality: u32,
        filter: Option<&ExclusionFilter>,
        sort: &SortSpec,
    ) -> Result<StreamSelection, ProviderError> {
        let streams = self.streams(request).await?;
        let selection = select_best_stream(streams, max_quality, filter, sort);

        let outcome = match &selection {
            Ok(s) if s.cached => "cached",
            Ok(_) => "uncached",
            Err(_) => "none",
        };
        metrics::STREAM_SELECTIONS
            .with_label_values(&[outcome])
            .inc();

        selection
    }
}

/// Select the best stream from an aggregated list.
///
/// Keeps provider-claimed cached streams at or below `max_quality` that pass the
/// exclusion filter, sorted by `sort`. When none qualify, the first stream that
/// passes the exclusion filter is returned with `cached: false`.
pub fn select_best_stream(
    streams: Vec<StreamCandidate>,
    max_quality: u32,
    filter: Option<&ExclusionFilter>,
    sort: &SortSpec,
) -> Result<StreamSelection, ProviderError> {
    if streams.is_empty() {
        return Err(ProviderError::NoStreams);
    }

    let total = streams.len();
    let allowed: Vec<StreamCandidate> = streams
        .into_iter()
        .filter(|s| match filter {
            Some(f) if f.excludes(s) => {
                debug!(name = %s.name, "Stream excluded by release filter");
                false
            }
            _ => true,
        })
        .collect();

    let mut cached: Vec<StreamCandidate> = allowed
        .iter()
        .filter(|s| s.cached && parse_quality_int(&s.quality) <= max_quality)
        .cloned()
        .collect();

    debug!(
        total,
        allowed = allowed.len(),
        cached = cached.len(),
        max_quality,
        "Filtered streams"
    );

    if cached.is_empty() {
        return match allowed.into_iter().next() {
            Some(stream) => {
                warn!(name = %stream.name, "No cached stream qualified, using first available");
                Ok(StreamSelection {
                    stream,
                    cached: false,
                })
            }
            None => Err(ProviderError::NoStreamsAfterFiltering),
        };
    }

    sort.sort(&mut cached);
    let stream = cached.swap_remove(0);
    Ok(StreamSelection {
        stream,
        cached: true,
    })
}
