//! Cached stream-URL resolution.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::DebridConfig;
use crate::metrics;

use super::{DebridError, DebridService};

/// Resolves playback URLs through a debrid service, remembering each result.
///
/// Entries live for the configured TTL (24h by default) and are keyed by
/// `(hash, file_index)`. Failures are not cached.
pub struct StreamUrlResolver {
    service: Arc<dyn DebridService>,
    cache: TtlCache<(String, Option<u32>), String>,
}

impl StreamUrlResolver {
    pub fn new(service: Arc<dyn DebridService>, ttl: Duration) -> Self {
        Self::with_clock(service, ttl, Arc::new(SystemClock))
    }

    /// Resolver whose entries live for `url_cache_ttl_secs`.
    pub fn from_config(service: Arc<dyn DebridService>, config: &DebridConfig) -> Self {
        Self::new(service, Duration::from_secs(config.url_cache_ttl_secs))
    }

    pub fn with_clock(service: Arc<dyn DebridService>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    pub async fn resolve(&self, hash: &str, file_index: Option<u32>) -> Result<String, DebridError> {
        let key = (hash.to_lowercase(), file_index);

        if let Some(url) = self.cache.get(&key).await {
            debug!(hash, "Stream URL cache hit");
            metrics::DEBRID_URL_RESOLUTIONS
                .with_label_values(&["cache"])
                .inc();
            return Ok(url);
        }

        match self.service.get_stream_url(hash, file_index).await {
            Ok(url) => {
                metrics::DEBRID_URL_RESOLUTIONS
                    .with_label_values(&["service"])
                    .inc();
                self.cache.insert(key, url.clone()).await;
                Ok(url)
            }
            Err(e) => {
                metrics::DEBRID_URL_RESOLUTIONS
                    .with_label_values(&["error"])
                    .inc();
                Err(e)
            }
        }
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::testing::MockDebridService;

    fn resolver() -> (StreamUrlResolver, Arc<MockDebridService>, Arc<ManualClock>) {
        let service = Arc::new(MockDebridService::new());
        let clock = Arc::new(ManualClock::new());
        let resolver = StreamUrlResolver::with_clock(
            service.clone(),
            Duration::from_secs(24 * 60 * 60),
            clock.clone(),
        );
        (resolver, service, clock)
    }

    #[tokio::test]
    async fn test_resolves_once_within_ttl() {
        let (resolver, service, clock) = resolver();
        service.set_cached(&["abc"]).await;

        let first = resolver.resolve("abc", Some(0)).await.unwrap();
        clock.advance(Duration::from_secs(23 * 60 * 60));
        let second = resolver.resolve("ABC", Some(0)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.stream_url_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_re_resolves_after_ttl_and_per_file() {
        let (resolver, service, clock) = resolver();
        service.set_cached(&["abc"]).await;

        resolver.resolve("abc", Some(0)).await.unwrap();
        resolver.resolve("abc", Some(1)).await.unwrap();
        assert_eq!(service.stream_url_calls().await.len(), 2);

        clock.advance(Duration::from_secs(24 * 60 * 60));
        resolver.resolve("abc", Some(0)).await.unwrap();
        assert_eq!(service.stream_url_calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_ttl_comes_from_config() {
        let service = Arc::new(MockDebridService::new());
        service.set_cached(&["abc"]).await;
        let config = DebridConfig {
            url_cache_ttl_secs: 0,
            ..Default::default()
        };
        let resolver = StreamUrlResolver::from_config(service.clone(), &config);

        resolver.resolve("abc", None).await.unwrap();
        resolver.resolve("abc", None).await.unwrap();
        assert_eq!(service.stream_url_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (resolver, service, _clock) = resolver();

        let err = resolver.resolve("missing", None).await.unwrap_err();
        assert!(matches!(err, DebridError::NotCached(_)));

        service.set_cached(&["missing"]).await;
        assert!(resolver.resolve("missing", None).await.is_ok());
    }
}
