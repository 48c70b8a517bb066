//! Duplicate detection across the library's stored streams.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::store::{LibraryEntry, StreamStore};

use super::similarity::{normalize_title, similarity};
use super::{DuplicateError, DuplicateMatch, DuplicateStats, MatchType, DEFAULT_THRESHOLD};

/// Finds media items whose stored streams are the same release or the same title.
pub struct DuplicateDetector {
    store: Arc<dyn StreamStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }

    /// Hash duplicates first, then fuzzy title duplicates among available streams.
    ///
    /// A threshold outside `[0, 1]` falls back to 0.85. Each unordered pair of
    /// media ids is reported once.
    pub fn find_duplicates(&self, threshold: f64) -> Result<Vec<DuplicateMatch>, DuplicateError> {
        let threshold = if (0.0..=1.0).contains(&threshold) {
            threshold
        } else {
            warn!(threshold, "Invalid similarity threshold, using default");
            DEFAULT_THRESHOLD
        };

        let mut matches = self.find_hash_duplicates()?;
        matches.extend(self.find_title_duplicates(threshold)?);

        let mut seen: HashSet<(i64, i64)> = HashSet::new();
        matches.retain(|m| seen.insert(m.pair_key()));

        debug!(count = matches.len(), threshold, "Duplicate scan complete");
        Ok(matches)
    }

    fn find_hash_duplicates(&self) -> Result<Vec<DuplicateMatch>, DuplicateError> {
        let titles: HashMap<i64, String> = self
            .store
            .list_media()?
            .into_iter()
            .map(|m| (m.id, m.title))
            .collect();

        let mut by_hash: BTreeMap<String, Vec<LibraryEntry>> = BTreeMap::new();
        for stream in self.store.list_streams()? {
            if stream.record.stream_hash.is_empty() {
                continue;
            }
            by_hash
                .entry(stream.record.stream_hash.clone())
                .or_default()
                .push(LibraryEntry {
                    media_id: stream.media_id,
                    title: titles.get(&stream.media_id).cloned().unwrap_or_default(),
                    stream_hash: stream.record.stream_hash,
                    quality_score: stream.record.quality_score,
                });
        }

        let mut matches = Vec::new();
        for items in by_hash.values() {
            for (i, a) in items.iter().enumerate() {
                for b in &items[i + 1..] {
                    matches.push(DuplicateMatch::between(a, b, 1.0, MatchType::Hash));
                }
            }
        }
        Ok(matches)
    }

    fn find_title_duplicates(&self, threshold: f64) -> Result<Vec<DuplicateMatch>, DuplicateError> {
        let entries = self.store.list_available_entries()?;
        let normalized: Vec<String> = entries.iter().map(|e| normalize_title(&e.title)).collect();

        let mut matches = Vec::new();
        for i in 0..entries.len() {
            for j in i + 1..entries.len() {
                let (a, b) = (&entries[i], &entries[j]);

                // Same release is a hash duplicate
                if !a.stream_hash.is_empty() && a.stream_hash == b.stream_hash {
                    continue;
                }

                // Nothing left to compare once years and punctuation are gone
                if normalized[i].is_empty() || normalized[j].is_empty() {
                    continue;
                }

                let score = similarity(&normalized[i], &normalized[j]);
                if score < threshold {
                    continue;
                }

                let match_type = if score == 1.0 {
                    MatchType::ExactTitle
                } else {
                    MatchType::FuzzyTitle
                };
                matches.push(DuplicateMatch::between(a, b, score, match_type));
            }
        }
        Ok(matches)
    }

    /// Counts of duplicates by match type.
    pub fn duplicate_stats(&self, threshold: f64) -> Result<DuplicateStats, DuplicateError> {
        let matches = self.find_duplicates(threshold)?;

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for m in &matches {
            *by_type.entry(m.match_type.as_str().to_string()).or_default() += 1;
        }

        Ok(DuplicateStats {
            total_duplicates: matches.len(),
            by_type,
        })
    }

    /// Hashes stored for more than one media item.
    pub fn find_hash_collisions(&self) -> Result<Vec<String>, DuplicateError> {
        let mut media_by_hash: BTreeMap<String, HashSet<i64>> = BTreeMap::new();
        for stream in self.store.list_streams()? {
            if !stream.record.stream_hash.is_empty() {
                media_by_hash
                    .entry(stream.record.stream_hash)
                    .or_default()
                    .insert(stream.media_id);
            }
        }

        Ok(media_by_hash
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(hash, _)| hash)
            .collect())
    }

    /// Delete the stream of the lower-quality side of a match.
    pub fn resolve_duplicate(&self, duplicate: &DuplicateMatch) -> Result<(), DuplicateError> {
        let loser = duplicate.loser_media_id();
        self.store.delete_stream(loser)?;

        metrics::DUPLICATES_RESOLVED
            .with_label_values(&[duplicate.match_type.as_str()])
            .inc();
        info!(
            kept = duplicate.better_media_id,
            removed = loser,
            match_type = duplicate.match_type.as_str(),
            similarity = duplicate.similarity,
            "Resolved duplicate"
        );
        Ok(())
    }

    /// Find duplicates and, unless `dry_run`, delete every losing stream.
    ///
    /// Stops at the first failed delete. Deletions already made are kept and
    /// reported in [`DuplicateError::PartialResolution`].
    pub fn auto_resolve(
        &self,
        threshold: f64,
        dry_run: bool,
    ) -> Result<Vec<DuplicateMatch>, DuplicateError> {
        let matches = self.find_duplicates(threshold)?;
        if dry_run {
            info!(count = matches.len(), "Dry run, no duplicates removed");
            return Ok(matches);
        }

        let mut resolved = Vec::with_capacity(matches.len());
        for duplicate in matches {
            if let Err(e) = self.resolve_duplicate(&duplicate) {
                let source = match e {
                    DuplicateError::Store(source) => source,
                    DuplicateError::PartialResolution { source, .. } => source,
                };
                warn!(error = %source, resolved = resolved.len(), "Duplicate resolution aborted");
                return Err(DuplicateError::PartialResolution { resolved, source });
            }
            resolved.push(duplicate);
        }

        info!(count = resolved.len(), "Duplicates resolved");
        Ok(resolved)
    }
}
