//! Types for the debrid boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A file inside a cached torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebridFile {
    /// File id as understood by the debrid service.
    pub index: u32,
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// Errors returned by debrid services.
#[derive(Debug, Error)]
pub enum DebridError {
    #[error("Debrid connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Debrid API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited by debrid service")]
    RateLimited,

    #[error("Debrid authentication failed")]
    Unauthorized,

    #[error("Torrent not cached: {0}")]
    NotCached(String),

    #[error("No download links available")]
    NoLinks,

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to decode debrid response: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for DebridError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DebridError::Timeout
        } else if e.is_connect() {
            DebridError::ConnectionFailed(e.to_string())
        } else {
            DebridError::Internal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DebridError {
    fn from(e: serde_json::Error) -> Self {
        DebridError::Decode(e.to_string())
    }
}

/// Boundary to a debrid service.
///
/// `check_cache` is authoritative over any provider-claimed cached flag.
#[async_trait]
pub trait DebridService: Send + Sync {
    /// Service name for logging ("Real-Debrid").
    fn service_name(&self) -> &str;

    /// Check which hashes are instantly available.
    ///
    /// The result has an entry for every requested hash.
    async fn check_cache(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError>;

    /// Resolve a direct playback URL for a cached hash.
    ///
    /// Fails with [`DebridError::NotCached`] when the service cannot serve it instantly.
    async fn get_stream_url(&self, hash: &str, file_index: Option<u32>)
        -> Result<String, DebridError>;

    /// Files of a cached torrent.
    async fn available_files(&self, hash: &str) -> Result<Vec<DebridFile>, DebridError>;

    /// Whether the configured credentials are accepted.
    async fn is_authenticated(&self) -> bool;
}
