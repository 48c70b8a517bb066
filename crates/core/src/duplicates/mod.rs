//! Duplicate detector.
//!
//! Two media items are duplicates when their stored streams share a torrent
//! hash, or when their normalised titles are similar enough. Resolution keeps
//! the higher-scoring item and deletes the other item's stream.

mod detector;
mod similarity;

pub use detector::DuplicateDetector;
pub use similarity::{levenshtein, normalize_title, similarity};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::store::{LibraryEntry, StoreError};

/// Similarity threshold used when none (or an invalid one) is given.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// How a duplicate pair was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Hash,
    ExactTitle,
    FuzzyTitle,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Hash => "hash",
            MatchType::ExactTitle => "exact_title",
            MatchType::FuzzyTitle => "fuzzy_title",
        }
    }
}

/// A pair of media items judged to be duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub media_id_1: i64,
    pub media_id_2: i64,
    pub hash_1: String,
    pub hash_2: String,
    pub title_1: String,
    pub title_2: String,
    /// 0.0 to 1.0; always 1.0 for hash matches.
    pub similarity: f64,
    pub match_type: MatchType,
    pub quality_score_1: i32,
    pub quality_score_2: i32,
    /// The item to keep. Ties keep the first.
    pub better_media_id: i64,
}

impl DuplicateMatch {
    pub(crate) fn between(
        a: &LibraryEntry,
        b: &LibraryEntry,
        similarity: f64,
        match_type: MatchType,
    ) -> Self {
        let better_media_id = if a.quality_score >= b.quality_score {
            a.media_id
        } else {
            b.media_id
        };

        Self {
            media_id_1: a.media_id,
            media_id_2: b.media_id,
            hash_1: a.stream_hash.clone(),
            hash_2: b.stream_hash.clone(),
            title_1: a.title.clone(),
            title_2: b.title.clone(),
            similarity,
            match_type,
            quality_score_1: a.quality_score,
            quality_score_2: b.quality_score,
            better_media_id,
        }
    }

    /// The item whose stream is removed on resolution.
    pub fn loser_media_id(&self) -> i64 {
        if self.better_media_id == self.media_id_1 {
            self.media_id_2
        } else {
            self.media_id_1
        }
    }

    /// Unordered pair key, smaller id first.
    pub fn pair_key(&self) -> (i64, i64) {
        (
            self.media_id_1.min(self.media_id_2),
            self.media_id_1.max(self.media_id_2),
        )
    }
}

/// Duplicate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateStats {
    pub total_duplicates: usize,
    /// Keyed by match type label.
    pub by_type: BTreeMap<String, usize>,
}

/// Errors from duplicate detection and resolution.
#[derive(Debug, Error)]
pub enum DuplicateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A delete failed part-way through a batch. Earlier deletions stand.
    #[error("Duplicate resolution stopped after {} deletions: {source}", .resolved.len())]
    PartialResolution {
        resolved: Vec<DuplicateMatch>,
        source: StoreError,
    },
}
