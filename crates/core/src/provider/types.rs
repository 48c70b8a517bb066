//! Types for stream providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A playable stream offered by a provider, normalized across sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamCandidate {
    /// Provider display name (often carries the cache marker and resolution).
    pub name: String,
    /// Release title, possibly multi-line with size and seeder annotations.
    pub title: String,
    /// Torrent info hash, lowercase hex. Empty when unknown.
    #[serde(default)]
    pub info_hash: String,
    /// Index of the file inside the torrent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_idx: Option<u32>,
    /// Resolvable playback URL.
    #[serde(default)]
    pub url: String,
    /// Name of the provider that produced this stream.
    pub source: String,
    /// Whether the provider claims the stream is debrid-cached.
    #[serde(default)]
    pub cached: bool,
    /// Size in bytes, 0 when unknown.
    #[serde(default)]
    pub size: u64,
    /// Resolution label ("2160p", "1080p", "Unknown", ...).
    pub quality: String,
    #[serde(default)]
    pub seeders: u32,
    /// File name hinted by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl StreamCandidate {
    /// Name and title joined, as used for parsing and text filters.
    pub fn display_text(&self) -> String {
        format!("{} {}", self.name, self.title)
    }
}

/// What to fetch streams for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaRequest {
    Movie {
        imdb_id: String,
    },
    Episode {
        imdb_id: String,
        season: u32,
        episode: u32,
    },
}

impl MediaRequest {
    pub fn movie(imdb_id: impl Into<String>) -> Self {
        Self::Movie {
            imdb_id: imdb_id.into(),
        }
    }

    pub fn episode(imdb_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self::Episode {
            imdb_id: imdb_id.into(),
            season,
            episode,
        }
    }

    /// Build from optional episode coordinates. Both must be present for an episode.
    pub fn from_parts(imdb_id: impl Into<String>, season: Option<u32>, episode: Option<u32>) -> Self {
        match (season, episode) {
            (Some(season), Some(episode)) => Self::episode(imdb_id, season, episode),
            _ => Self::movie(imdb_id),
        }
    }

    pub fn imdb_id(&self) -> &str {
        match self {
            Self::Movie { imdb_id } | Self::Episode { imdb_id, .. } => imdb_id,
        }
    }

    /// Stremio addon resource path: `movie/<id>` or `series/<id>:<s>:<e>`.
    pub fn addon_path(&self) -> String {
        match self {
            Self::Movie { imdb_id } => format!("movie/{}", imdb_id),
            Self::Episode {
                imdb_id,
                season,
                episode,
            } => format!("series/{}:{}:{}", imdb_id, season, episode),
        }
    }

    /// Key used for response caching.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Movie { imdb_id } => format!("movie_{}", imdb_id),
            Self::Episode {
                imdb_id,
                season,
                episode,
            } => format!("series_{}_s{}e{}", imdb_id, season, episode),
        }
    }
}

impl fmt::Display for MediaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie { imdb_id } => write!(f, "{}", imdb_id),
            Self::Episode {
                imdb_id,
                season,
                episode,
            } => write!(f, "{} S{:02}E{:02}", imdb_id, season, episode),
        }
    }
}

/// The stream chosen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub stream: StreamCandidate,
    /// False when no cached stream qualified and the first filtered
    /// stream was returned instead.
    pub cached: bool,
}

/// Errors that can occur while fetching or selecting streams.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("All providers failed")]
    AllProvidersFailed(HashMap<String, String>),

    #[error("No streams found")]
    NoStreams,

    #[error("No streams available after filtering")]
    NoStreamsAfterFiltering,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::ConnectionFailed(e.to_string())
        } else {
            ProviderError::ApiError(e.to_string())
        }
    }
}

/// A source of streams for movies and series episodes.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Provider name for logging and attribution.
    fn name(&self) -> &str;

    /// Fetch streams for a movie or episode.
    async fn streams(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError>;

    async fn movie_streams(&self, imdb_id: &str) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.streams(&MediaRequest::movie(imdb_id)).await
    }

    async fn series_streams(
        &self,
        imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.streams(&MediaRequest::episode(imdb_id, season, episode))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_paths_and_keys() {
        let movie = MediaRequest::movie("tt0133093");
        assert_eq!(movie.addon_path(), "movie/tt0133093");
        assert_eq!(movie.cache_key(), "movie_tt0133093");

        let episode = MediaRequest::episode("tt0903747", 5, 14);
        assert_eq!(episode.addon_path(), "series/tt0903747:5:14");
        assert_eq!(episode.cache_key(), "series_tt0903747_s5e14");
        assert_eq!(episode.to_string(), "tt0903747 S05E14");
    }

    #[test]
    fn test_from_parts_needs_both_coordinates() {
        assert_eq!(
            MediaRequest::from_parts("tt1", Some(1), None),
            MediaRequest::movie("tt1")
        );
        assert_eq!(
            MediaRequest::from_parts("tt1", Some(1), Some(2)),
            MediaRequest::episode("tt1", 1, 2)
        );
    }

    #[test]
    fn test_candidate_deserializes_with_missing_fields() {
        let json = r#"{"name":"Torrentio","title":"Movie","source":"torrentio","quality":"1080p"}"#;
        let candidate: StreamCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.info_hash, "");
        assert_eq!(candidate.size, 0);
        assert!(!candidate.cached);
        assert_eq!(candidate.file_idx, None);
    }
}
