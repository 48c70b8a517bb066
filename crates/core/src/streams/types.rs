//! Types for ranked streams.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debrid::DebridError;
use crate::provider::StreamCandidate;
use crate::quality::{
    parse_quality, score_quality, HdrType, ParsedQuality, QualityScore, Resolution, SourceType,
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A stream with its parsed quality and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStream {
    pub stream: StreamCandidate,
    pub quality: ParsedQuality,
    pub score: QualityScore,
}

impl RankedStream {
    /// Parse and score a candidate.
    ///
    /// Quality comes from the release title (the name when the title is empty).
    /// Size prefers the title's size token, then the candidate's byte count.
    pub fn from_candidate(stream: StreamCandidate) -> Self {
        let text = if stream.title.is_empty() {
            &stream.name
        } else {
            &stream.title
        };

        let mut quality = parse_quality(text).with_seeders(stream.seeders);
        if quality.size_gb <= 0.0 && stream.size > 0 {
            quality.size_gb = stream.size as f64 / GIB;
        }
        let score = score_quality(&quality);

        Self {
            stream,
            quality,
            score,
        }
    }

    pub fn total_score(&self) -> i32 {
        self.score.total_score
    }

    pub fn resolution(&self) -> Resolution {
        self.quality.resolution
    }

    pub fn info_hash(&self) -> &str {
        &self.stream.info_hash
    }

    /// Attributes relevant to upgrade decisions.
    pub fn grade(&self) -> StreamGrade {
        StreamGrade {
            resolution: self.quality.resolution,
            hdr_type: self.quality.hdr_type,
            source: self.quality.source,
            score: self.score.total_score,
        }
    }
}

/// The attributes an upgrade decision looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGrade {
    pub resolution: Resolution,
    pub hdr_type: HdrType,
    pub source: SourceType,
    pub score: i32,
}

impl StreamGrade {
    /// Grade with only a score; the other attributes are the lowest tier.
    pub fn with_score(score: i32) -> Self {
        Self {
            resolution: Resolution::Sd,
            hdr_type: HdrType::Sdr,
            source: SourceType::Unknown,
            score,
        }
    }
}

/// Errors from the cache filter and ranker.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Debrid cache check failed: {0}")]
    CacheCheck(#[from] DebridError),
}
