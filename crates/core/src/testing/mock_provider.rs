//! Mock stream provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::provider::{MediaRequest, ProviderError, StreamCandidate, StreamProvider};

/// Mock implementation of the StreamProvider trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable streams, globally or per request
/// - Record every request for assertions
/// - Simulate failures and slow responses
///
/// # Example
///
/// ```rust,ignore
/// use streamarr_core::testing::{MockStreamProvider, fixtures};
///
/// let provider = MockStreamProvider::new("torrentio");
/// provider.set_streams(vec![fixtures::stream("Movie 1080p", "abc", "1080p")]).await;
///
/// let streams = provider.movie_streams("tt0133093").await?;
/// assert_eq!(streams.len(), 1);
/// assert_eq!(provider.call_count().await, 1);
/// ```
pub struct MockStreamProvider {
    name: String,
    /// Returned when no per-request entry matches.
    streams: Arc<RwLock<Vec<StreamCandidate>>>,
    /// Streams keyed by `MediaRequest::cache_key`.
    by_request: Arc<RwLock<HashMap<String, Vec<StreamCandidate>>>>,
    /// If set, every call fails with this message.
    failure: Arc<RwLock<Option<String>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    requests: Arc<RwLock<Vec<MediaRequest>>>,
}

impl std::fmt::Debug for MockStreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStreamProvider")
            .field("name", &self.name)
            .finish()
    }
}

impl MockStreamProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streams: Arc::new(RwLock::new(Vec::new())),
            by_request: Arc::new(RwLock::new(HashMap::new())),
            failure: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Streams returned for any request without a specific entry.
    pub async fn set_streams(&self, streams: Vec<StreamCandidate>) {
        *self.streams.write().await = streams;
    }

    /// Streams returned for one specific request.
    pub async fn set_streams_for(&self, request: &MediaRequest, streams: Vec<StreamCandidate>) {
        self.by_request
            .write()
            .await
            .insert(request.cache_key(), streams);
    }

    /// Make every subsequent call fail.
    pub async fn set_failure(&self, message: &str) {
        *self.failure.write().await = Some(message.to_string());
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// Delay every response by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn recorded_requests(&self) -> Vec<MediaRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl StreamProvider for MockStreamProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn streams(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.read().await.clone() {
            return Err(ProviderError::ConnectionFailed(message));
        }

        if let Some(streams) = self.by_request.read().await.get(&request.cache_key()) {
            return Ok(streams.clone());
        }

        Ok(self.streams.read().await.clone())
    }
}
