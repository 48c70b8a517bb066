//! Debrid-cache filtering and quality ranking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReleaseFilters;
use crate::debrid::{DebridService, MAX_BATCH_SIZE};
use crate::metrics;
use crate::provider::StreamCandidate;
use crate::quality::{parse_quality, score_quality, HdrType, Resolution, SourceType};

use super::{RankedStream, StreamError, StreamGrade};

/// Confirms cache status through a debrid service and ranks what survives.
pub struct StreamService {
    debrid: Arc<dyn DebridService>,
    batch_size: usize,
}

impl StreamService {
    pub fn new(debrid: Arc<dyn DebridService>) -> Self {
        Self {
            debrid,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Hashes per cache-check call, clamped to 1..=100.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Keep only streams the debrid service confirms as cached.
    ///
    /// Hashes are checked in batches of at most `batch_size`. Streams without a
    /// hash are dropped, only the first stream per hash is kept, and input order
    /// is preserved. A failed batch fails the whole call; provider-claimed
    /// cached flags are never trusted.
    pub async fn filter_to_debrid_cached(
        &self,
        streams: Vec<StreamCandidate>,
    ) -> Result<Vec<StreamCandidate>, StreamError> {
        let total = streams.len();

        let mut seen: HashSet<String> = HashSet::new();
        let hashes: Vec<String> = streams
            .iter()
            .map(|s| s.info_hash.to_lowercase())
            .filter(|h| !h.is_empty() && seen.insert(h.clone()))
            .collect();

        if hashes.is_empty() {
            debug!(total, "No hashes to check");
            return Ok(Vec::new());
        }

        info!(
            total_streams = total,
            hashes = hashes.len(),
            service = self.debrid.service_name(),
            "Checking debrid cache"
        );

        let mut cached: HashMap<String, bool> = HashMap::with_capacity(hashes.len());
        for batch in hashes.chunks(self.batch_size) {
            metrics::DEBRID_HASHES_CHECKED.inc_by(batch.len() as u64);
            match self.debrid.check_cache(batch).await {
                Ok(result) => {
                    metrics::DEBRID_CHECK_BATCHES
                        .with_label_values(&["success"])
                        .inc();
                    cached.extend(result.into_iter().map(|(h, c)| (h.to_lowercase(), c)));
                }
                Err(e) => {
                    metrics::DEBRID_CHECK_BATCHES
                        .with_label_values(&["error"])
                        .inc();
                    error!(error = %e, "Debrid cache check failed");
                    return Err(e.into());
                }
            }
        }

        let mut kept: HashSet<String> = HashSet::new();
        let cached_streams: Vec<StreamCandidate> = streams
            .into_iter()
            .filter_map(|mut stream| {
                let hash = stream.info_hash.to_lowercase();
                let is_cached = cached.get(&hash).copied().unwrap_or(false);
                if hash.is_empty() || !is_cached || !kept.insert(hash) {
                    return None;
                }
                stream.cached = true;
                Some(stream)
            })
            .collect();

        metrics::CACHED_CANDIDATES
            .with_label_values(&[])
            .observe(cached_streams.len() as f64);
        info!(
            total,
            cached = cached_streams.len(),
            filtered_out = total - cached_streams.len(),
            "Filtered to debrid-cached streams"
        );

        Ok(cached_streams)
    }

    /// Filter, rank and take the best. `None` when nothing is cached.
    pub async fn find_best_cached_stream(
        &self,
        streams: Vec<StreamCandidate>,
    ) -> Result<Option<RankedStream>, StreamError> {
        let cached = self.filter_to_debrid_cached(streams).await?;
        if cached.is_empty() {
            warn!("No debrid-cached streams available");
            return Ok(None);
        }

        let best = score_and_rank(cached).into_iter().next();
        if let Some(best) = &best {
            info!(
                title = %best.stream.title,
                score = best.total_score(),
                resolution = %best.quality.resolution,
                hdr = %best.quality.hdr_type,
                audio = %best.quality.audio_format,
                source = %best.quality.source,
                size_gb = best.quality.size_gb,
                seeders = best.quality.seeders,
                "Selected best debrid-cached stream"
            );
        }
        Ok(best)
    }

    /// The `n` best cached streams, best first.
    pub async fn top_n_streams(
        &self,
        streams: Vec<StreamCandidate>,
        n: usize,
    ) -> Result<Vec<RankedStream>, StreamError> {
        let cached = self.filter_to_debrid_cached(streams).await?;
        let mut ranked = score_and_rank(cached);
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Best cached stream for each resolution bucket.
    pub async fn best_per_resolution(
        &self,
        streams: Vec<StreamCandidate>,
    ) -> Result<BTreeMap<Resolution, RankedStream>, StreamError> {
        let cached = self.filter_to_debrid_cached(streams).await?;
        let best: BTreeMap<Resolution, RankedStream> = group_by_resolution(score_and_rank(cached))
            .into_iter()
            .filter_map(|(resolution, group)| group.into_iter().next().map(|s| (resolution, s)))
            .collect();

        info!(resolutions = best.len(), "Selected best streams per resolution");
        Ok(best)
    }
}

/// Score every stream and sort by total score, highest first.
///
/// Takes ownership of the input. The sort is stable, so ties keep their input order.
pub fn score_and_rank(streams: Vec<StreamCandidate>) -> Vec<RankedStream> {
    let mut ranked: Vec<RankedStream> = streams
        .into_iter()
        .map(RankedStream::from_candidate)
        .inspect(|r| {
            debug!(
                title = %r.stream.title,
                score = r.score.total_score,
                resolution = r.score.resolution_score,
                hdr = r.score.hdr_score,
                audio = r.score.audio_score,
                source = r.score.source_score,
                seeders = r.score.seeders_score,
                penalty = r.score.size_penalty,
                "Stream scored"
            )
        })
        .collect();
    ranked.sort_by(|a, b| b.total_score().cmp(&a.total_score()));
    ranked
}

/// Build a ranked stream from a bare release name.
pub fn parse_stream(title: &str, hash: &str, indexer: &str, seeders: u32) -> RankedStream {
    let quality = parse_quality(title).with_seeders(seeders);
    let score = score_quality(&quality);

    RankedStream {
        stream: StreamCandidate {
            name: title.to_string(),
            title: title.to_string(),
            info_hash: hash.to_lowercase(),
            source: indexer.to_string(),
            quality: quality.resolution.to_string(),
            seeders,
            size: (quality.size_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            ..Default::default()
        },
        quality,
        score,
    }
}

/// Coarse resolution tier; 576p and 480p share a tier.
fn resolution_tier(resolution: Resolution) -> u8 {
    match resolution {
        Resolution::P2160 => 4,
        Resolution::P1080 => 3,
        Resolution::P720 => 2,
        Resolution::P576 | Resolution::P480 => 1,
        Resolution::Sd => 0,
    }
}

/// Keep streams meeting both the resolution tier and the score floor.
pub fn filter_by_minimum_quality(
    streams: Vec<RankedStream>,
    min_resolution: Resolution,
    min_score: i32,
) -> Vec<RankedStream> {
    let original = streams.len();
    let min_tier = resolution_tier(min_resolution);

    let filtered: Vec<RankedStream> = streams
        .into_iter()
        .filter(|s| resolution_tier(s.resolution()) >= min_tier && s.total_score() >= min_score)
        .collect();

    debug!(
        original,
        filtered = filtered.len(),
        min_resolution = %min_resolution,
        min_score,
        "Filtered by minimum quality"
    );
    filtered
}

/// Group by resolution; each group is sorted by score, highest first.
pub fn group_by_resolution(streams: Vec<RankedStream>) -> BTreeMap<Resolution, Vec<RankedStream>> {
    let mut groups: BTreeMap<Resolution, Vec<RankedStream>> = BTreeMap::new();
    for stream in streams {
        groups.entry(stream.resolution()).or_default().push(stream);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| b.total_score().cmp(&a.total_score()));
    }
    groups
}

/// Substring exclusion check against the release title.
///
/// Each of the group, quality and language lists is split on `,` or `|` and
/// matched case-insensitively as a plain substring. The `enabled` flag and the
/// custom pattern are not consulted; those belong to the regex filter.
pub fn should_filter_stream(stream: &RankedStream, filters: &ReleaseFilters) -> bool {
    let name = stream.stream.title.to_uppercase();

    let lists = [
        ("group", &filters.excluded_groups),
        ("quality", &filters.excluded_qualities),
        ("language", &filters.excluded_languages),
    ];

    for (kind, list) in lists {
        let blocked = list
            .split([',', '|'])
            .map(|t| t.trim().to_uppercase())
            .find(|t| !t.is_empty() && name.contains(t.as_str()));
        if let Some(token) = blocked {
            debug!(stream = %stream.stream.title, kind, blocked = %token, "Stream filtered");
            return true;
        }
    }

    false
}

/// Decide whether `candidate` should replace `current`.
///
/// Requires a score gain of at least `min_improvement`, and never gives up 2160p,
/// a REMUX source or Dolby Vision regardless of score.
pub fn should_upgrade(current: &StreamGrade, candidate: &StreamGrade, min_improvement: i32) -> bool {
    let improvement = candidate.score - current.score;
    if improvement < min_improvement {
        return false;
    }

    if current.resolution == Resolution::P2160 && candidate.resolution != Resolution::P2160 {
        return false;
    }

    if current.source == SourceType::Remux && candidate.source != SourceType::Remux {
        return false;
    }

    if current.hdr_type == HdrType::DolbyVision && candidate.hdr_type != HdrType::DolbyVision {
        return false;
    }

    debug!(
        improvement,
        current_score = current.score,
        candidate_score = candidate.score,
        "Upgrade accepted"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockDebridService};

    fn service(mock: &Arc<MockDebridService>) -> StreamService {
        StreamService::new(mock.clone())
    }

    fn grade(resolution: Resolution, source: SourceType, hdr_type: HdrType, score: i32) -> StreamGrade {
        StreamGrade {
            resolution,
            hdr_type,
            source,
            score,
        }
    }

    #[tokio::test]
    async fn test_filter_keeps_only_confirmed_hashes_in_order() {
        let mock = Arc::new(MockDebridService::new());
        mock.set_cached(&["bbb", "aaa"]).await;

        let streams = vec![
            fixtures::stream("A", "AAA", "1080p"),
            fixtures::stream("B", "bbb", "720p"),
            fixtures::stream("C", "ccc", "2160p"),
            fixtures::stream("no hash", "", "2160p"),
        ];
        let cached = service(&mock).filter_to_debrid_cached(streams).await.unwrap();

        let names: Vec<_> = cached.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(mock.check_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_ignores_provider_claims() {
        let mock = Arc::new(MockDebridService::new());
        let mut claimed = fixtures::stream("claimed", "aaa", "1080p");
        claimed.cached = true;
        let unclaimed = fixtures::uncached_stream("unclaimed", "bbb", "1080p");
        mock.set_cached(&["bbb"]).await;

        let cached = service(&mock)
            .filter_to_debrid_cached(vec![claimed, unclaimed])
            .await
            .unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "unclaimed");
        assert!(cached[0].cached);
    }

    #[tokio::test]
    async fn test_filter_dedups_by_hash() {
        let mock = Arc::new(MockDebridService::new());
        mock.set_cached(&["aaa"]).await;

        let streams = vec![
            fixtures::stream("first", "aaa", "1080p"),
            fixtures::stream("second", "AAA", "1080p"),
        ];
        let cached = service(&mock).filter_to_debrid_cached(streams).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "first");

        let calls = mock.check_calls().await;
        assert_eq!(calls[0], vec!["aaa".to_string()]);
    }

    #[tokio::test]
    async fn test_filter_batches_by_hundred() {
        let mock = Arc::new(MockDebridService::new());
        let streams: Vec<_> = (0..250)
            .map(|i| fixtures::stream(&format!("s{i}"), &format!("{i:040x}"), "1080p"))
            .collect();

        let cached = service(&mock).filter_to_debrid_cached(streams).await.unwrap();
        assert!(cached.is_empty());

        let calls = mock.check_calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].len(), 100);
        assert_eq!(calls[2].len(), 50);
    }

    #[tokio::test]
    async fn test_filter_without_hashes_skips_service() {
        let mock = Arc::new(MockDebridService::new());
        let cached = service(&mock)
            .filter_to_debrid_cached(vec![fixtures::stream("x", "", "1080p")])
            .await
            .unwrap();
        assert!(cached.is_empty());
        assert!(mock.check_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_propagates_batch_failure() {
        let mock = Arc::new(MockDebridService::new());
        mock.set_cached(&["aaa"]).await;
        mock.set_failure("service down").await;

        let result = service(&mock)
            .filter_to_debrid_cached(vec![fixtures::stream("A", "aaa", "1080p")])
            .await;
        assert!(matches!(result, Err(StreamError::CacheCheck(_))));
    }

    #[tokio::test]
    async fn test_find_best_cached_stream() {
        let mock = Arc::new(MockDebridService::new());
        mock.set_cached(&["aaa", "bbb"]).await;

        let streams = vec![
            fixtures::titled_stream("Movie.2024.1080p.WEB-DL.AAC", "aaa"),
            fixtures::titled_stream("Movie.2024.2160p.DV.REMUX.TrueHD.Atmos", "bbb"),
            fixtures::titled_stream("Movie.2024.2160p.DV.REMUX.TrueHD.Atmos.HEVC", "ccc"),
        ];
        let best = service(&mock)
            .find_best_cached_stream(streams)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.info_hash(), "bbb");
        assert_eq!(best.total_score(), 90);
    }

    #[tokio::test]
    async fn test_find_best_none_cached_is_not_an_error() {
        let mock = Arc::new(MockDebridService::new());
        let best = service(&mock)
            .find_best_cached_stream(vec![fixtures::stream("A", "aaa", "1080p")])
            .await
            .unwrap();
        assert!(best.is_none());
    }

    #[tokio::test]
    async fn test_top_n_and_best_per_resolution() {
        let mock = Arc::new(MockDebridService::new());
        mock.set_cached(&["a", "b", "c", "d"]).await;

        let streams = vec![
            fixtures::titled_stream("Movie.720p.HDTV", "a"),
            fixtures::titled_stream("Movie.1080p.WEB-DL", "b"),
            fixtures::titled_stream("Movie.1080p.BluRay", "c"),
            fixtures::titled_stream("Movie.2160p.WEBRip", "d"),
        ];

        let top = service(&mock).top_n_streams(streams.clone(), 2).await.unwrap();
        let hashes: Vec<_> = top.iter().map(|s| s.info_hash()).collect();
        assert_eq!(hashes, vec!["d", "c"]);

        let top = service(&mock).top_n_streams(streams.clone(), 10).await.unwrap();
        assert_eq!(top.len(), 4);

        let best = service(&mock).best_per_resolution(streams).await.unwrap();
        assert_eq!(best.len(), 3);
        assert_eq!(best[&Resolution::P1080].info_hash(), "c");
        assert_eq!(best[&Resolution::P720].info_hash(), "a");
    }

    #[test]
    fn test_score_and_rank_is_stable() {
        let streams = vec![
            fixtures::titled_stream("First.1080p.WEB-DL", "a"),
            fixtures::titled_stream("Better.2160p.WEB-DL", "b"),
            fixtures::titled_stream("Second.1080p.WEB-DL", "c"),
        ];
        let ranked = score_and_rank(streams);
        let hashes: Vec<_> = ranked.iter().map(|s| s.info_hash()).collect();
        assert_eq!(hashes, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_stream() {
        let ranked = parse_stream("Movie.2024.2160p.HDR10.WEB-DL.DDP.12GB", "ABC", "yts", 10);
        assert_eq!(ranked.info_hash(), "abc");
        assert_eq!(ranked.stream.source, "yts");
        assert_eq!(ranked.quality.resolution, Resolution::P2160);
        assert_eq!(ranked.quality.hdr_type, HdrType::Hdr10);
        assert_eq!(ranked.quality.size_gb, 12.0);
        // 40 + 10 + 5 (DD) + 12 + 2
        assert_eq!(ranked.total_score(), 69);
    }

    #[test]
    fn test_filter_by_minimum_quality() {
        let streams = vec![
            parse_stream("A.2160p.REMUX", "a", "x", 0),
            parse_stream("B.1080p.HDTV", "b", "x", 0),
            parse_stream("C.576p.DVDRip", "c", "x", 0),
            parse_stream("D.480p.DVDRip", "d", "x", 0),
        ];

        let hd = filter_by_minimum_quality(streams.clone(), Resolution::P1080, 0);
        assert_eq!(hd.len(), 2);

        // 576p and 480p share a tier
        let sd = filter_by_minimum_quality(streams.clone(), Resolution::P576, 0);
        assert_eq!(sd.len(), 4);

        let scored = filter_by_minimum_quality(streams, Resolution::Sd, 40);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].info_hash(), "a");
    }

    #[test]
    fn test_group_by_resolution_sorts_groups() {
        let groups = group_by_resolution(vec![
            parse_stream("A.1080p.HDTV", "a", "x", 0),
            parse_stream("B.1080p.REMUX", "b", "x", 0),
            parse_stream("C.720p", "c", "x", 0),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Resolution::P1080][0].info_hash(), "b");
    }

    #[test]
    fn test_should_filter_stream_substring_match() {
        let stream = parse_stream("Movie.2024.1080p.HDCAM.RUSSIAN-TVHUB", "a", "x", 0);

        let filters = ReleaseFilters {
            excluded_groups: "yts, tvhub".to_string(),
            ..Default::default()
        };
        assert!(should_filter_stream(&stream, &filters));

        let filters = ReleaseFilters {
            excluded_languages: "HINDI|russian".to_string(),
            ..Default::default()
        };
        assert!(should_filter_stream(&stream, &filters));

        let filters = ReleaseFilters {
            excluded_qualities: "TS".to_string(),
            ..Default::default()
        };
        assert!(!should_filter_stream(&stream, &filters));

        assert!(!should_filter_stream(&stream, &ReleaseFilters::default()));
    }

    #[test]
    fn test_should_upgrade_requires_improvement() {
        let current = StreamGrade::with_score(50);
        assert!(!should_upgrade(&current, &StreamGrade::with_score(54), 10));
        assert!(should_upgrade(&current, &StreamGrade::with_score(60), 10));
    }

    #[test]
    fn test_should_upgrade_never_drops_2160p() {
        let current = grade(Resolution::P2160, SourceType::WebDl, HdrType::Sdr, 50);
        let candidate = grade(Resolution::P1080, SourceType::Remux, HdrType::Sdr, 90);
        assert!(!should_upgrade(&current, &candidate, 5));
    }

    #[test]
    fn test_should_upgrade_never_drops_remux() {
        let current = grade(Resolution::P1080, SourceType::Remux, HdrType::Sdr, 60);
        let candidate = grade(Resolution::P2160, SourceType::WebRip, HdrType::Sdr, 95);
        assert!(!should_upgrade(&current, &candidate, 5));
    }

    #[test]
    fn test_should_upgrade_never_loses_dolby_vision() {
        let current = grade(Resolution::P2160, SourceType::WebDl, HdrType::DolbyVision, 60);
        let candidate = grade(Resolution::P2160, SourceType::Remux, HdrType::Hdr10Plus, 95);
        assert!(!should_upgrade(&current, &candidate, 5));

        let candidate = grade(Resolution::P2160, SourceType::Remux, HdrType::DolbyVision, 95);
        assert!(should_upgrade(&current, &candidate, 5));
    }
}
