//! Mock debrid service for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::debrid::{DebridError, DebridFile, DebridService};

/// Mock implementation of the DebridService trait.
///
/// Hashes registered with [`set_cached`](Self::set_cached) are reported as
/// instantly available and resolve to a fake playback URL. Every cache check is
/// recorded so tests can assert on batching.
pub struct MockDebridService {
    cached: Arc<RwLock<HashSet<String>>>,
    /// If set, cache checks fail with this message.
    failure: Arc<RwLock<Option<String>>>,
    check_calls: Arc<RwLock<Vec<Vec<String>>>>,
    stream_url_calls: Arc<RwLock<Vec<(String, Option<u32>)>>>,
}

impl std::fmt::Debug for MockDebridService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDebridService")
            .field("cached", &"<cached>")
            .field("check_calls", &"<calls>")
            .finish()
    }
}

impl Default for MockDebridService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDebridService {
    pub fn new() -> Self {
        Self {
            cached: Arc::new(RwLock::new(HashSet::new())),
            failure: Arc::new(RwLock::new(None)),
            check_calls: Arc::new(RwLock::new(Vec::new())),
            stream_url_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Mark hashes as cached (case-insensitive).
    pub async fn set_cached(&self, hashes: &[&str]) {
        let mut cached = self.cached.write().await;
        cached.extend(hashes.iter().map(|h| h.to_lowercase()));
    }

    pub async fn remove_cached(&self, hash: &str) {
        self.cached.write().await.remove(&hash.to_lowercase());
    }

    /// Make cache checks fail.
    pub async fn set_failure(&self, message: &str) {
        *self.failure.write().await = Some(message.to_string());
    }

    /// Hash batches passed to `check_cache`, in call order.
    pub async fn check_calls(&self) -> Vec<Vec<String>> {
        self.check_calls.read().await.clone()
    }

    pub async fn stream_url_calls(&self) -> Vec<(String, Option<u32>)> {
        self.stream_url_calls.read().await.clone()
    }

    async fn is_cached(&self, hash: &str) -> bool {
        self.cached.read().await.contains(&hash.to_lowercase())
    }
}

#[async_trait]
impl DebridService for MockDebridService {
    fn service_name(&self) -> &str {
        "mock-debrid"
    }

    async fn check_cache(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError> {
        self.check_calls.write().await.push(hashes.to_vec());

        if let Some(message) = self.failure.read().await.clone() {
            return Err(DebridError::ConnectionFailed(message));
        }

        let cached = self.cached.read().await;
        Ok(hashes
            .iter()
            .map(|h| (h.clone(), cached.contains(&h.to_lowercase())))
            .collect())
    }

    async fn get_stream_url(&self, hash: &str, file_index: Option<u32>) -> Result<String, DebridError> {
        self.stream_url_calls
            .write()
            .await
            .push((hash.to_string(), file_index));

        if !self.is_cached(hash).await {
            return Err(DebridError::NotCached(hash.to_string()));
        }

        Ok(format!(
            "https://debrid.test/d/{}/{}",
            hash.to_lowercase(),
            file_index.unwrap_or(0)
        ))
    }

    async fn available_files(&self, hash: &str) -> Result<Vec<DebridFile>, DebridError> {
        if !self.is_cached(hash).await {
            return Err(DebridError::NotCached(hash.to_string()));
        }

        Ok(vec![DebridFile {
            index: 1,
            path: format!("/{}.mkv", hash.to_lowercase()),
            size: 0,
        }])
    }

    async fn is_authenticated(&self) -> bool {
        true
    }
}
