//! Types for the stream store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::provider::MediaRequest;
use crate::quality::{AudioFormat, Codec, HdrType, Resolution, SourceType};
use crate::streams::{RankedStream, StreamGrade};

/// Streams not checked for this many days count as stale.
pub const STALE_AFTER_DAYS: i64 = 14;

/// Streams scoring below this count as low quality.
pub const LOW_QUALITY_SCORE: i32 = 50;

/// A library item to add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedia {
    pub title: String,
    pub imdb_id: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// A library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl MediaItem {
    /// Provider request for this item, if it has an IMDb id.
    pub fn request(&self) -> Option<MediaRequest> {
        self.imdb_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| MediaRequest::from_parts(id, self.season, self.episode))
    }
}

/// The fields written when a stream is cached or replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_url: String,
    pub stream_hash: String,
    pub quality_score: i32,
    pub resolution: Resolution,
    pub hdr_type: HdrType,
    pub audio_format: AudioFormat,
    pub source_type: SourceType,
    pub codec: Codec,
    pub file_size_gb: f64,
    /// Provider the stream came from.
    pub indexer: String,
}

impl StreamRecord {
    pub fn from_ranked(ranked: &RankedStream) -> Self {
        Self {
            stream_url: ranked.stream.url.clone(),
            stream_hash: ranked.stream.info_hash.to_lowercase(),
            quality_score: ranked.score.total_score,
            resolution: ranked.quality.resolution,
            hdr_type: ranked.quality.hdr_type,
            audio_format: ranked.quality.audio_format,
            source_type: ranked.quality.source,
            codec: ranked.quality.codec,
            file_size_gb: ranked.quality.size_gb,
            indexer: ranked.stream.source.clone(),
        }
    }
}

/// The cached stream chosen for a media item. At most one per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedStream {
    pub media_id: i64,
    #[serde(flatten)]
    pub record: StreamRecord,
    pub cached_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
    pub check_count: u32,
    pub is_available: bool,
    pub upgrade_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check_at: Option<DateTime<Utc>>,
}

impl PersistedStream {
    /// Attributes used when deciding on an upgrade.
    pub fn grade(&self) -> StreamGrade {
        StreamGrade {
            resolution: self.record.resolution,
            hdr_type: self.record.hdr_type,
            source: self.record.source_type,
            score: self.record.quality_score,
        }
    }
}

/// An available stream joined with its media title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub media_id: i64,
    pub title: String,
    pub stream_hash: String,
    pub quality_score: i32,
}

/// Library-wide stream statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_media: u64,
    pub media_with_streams: u64,
    pub media_without_streams: u64,
    pub available_streams: u64,
    pub unavailable_streams: u64,
    pub upgrades_available: u64,
    /// 0 when no streams are stored.
    pub average_score: f64,
    /// Not checked in the last [`STALE_AFTER_DAYS`] days.
    pub stale_streams: u64,
    /// Scoring below [`LOW_QUALITY_SCORE`].
    pub low_quality_streams: u64,
    pub by_resolution: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub by_hdr: BTreeMap<String, u64>,
}

/// Errors that can occur in stream store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Media not found: {0}")]
    MediaNotFound(i64),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
