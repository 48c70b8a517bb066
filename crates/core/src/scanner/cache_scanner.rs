//! Library-wide cache scan and availability recheck.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::debrid::{DebridService, MAX_BATCH_SIZE};
use crate::metrics;
use crate::provider::{parse_quality_int, ExclusionFilter, MultiProvider, SortSpec, StreamCandidate};
use crate::store::{MediaItem, StreamRecord, StreamStore};
use crate::streams::{should_upgrade, StreamService};

use super::{RecheckReport, ScanError, ScanReport};

const DEFAULT_MIN_UPGRADE_POINTS: i32 = 10;
const DEFAULT_RECHECK_HOURS: i64 = 24;

/// What happened to one media item during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Cached,
    Upgraded,
    Skipped,
}

impl ItemOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Cached => "cached",
            ItemOutcome::Upgraded => "upgraded",
            ItemOutcome::Skipped => "skipped",
        }
    }
}

/// Keeps every library item pointed at its best debrid-cached stream.
pub struct CacheScanner {
    store: Arc<dyn StreamStore>,
    providers: Arc<MultiProvider>,
    debrid: Arc<dyn DebridService>,
    streams: StreamService,
    min_upgrade_points: i32,
    recheck_interval: Duration,
    batch_size: usize,
    filter: Option<ExclusionFilter>,
    max_quality: u32,
    sort: SortSpec,
}

impl CacheScanner {
    pub fn new(
        store: Arc<dyn StreamStore>,
        providers: Arc<MultiProvider>,
        debrid: Arc<dyn DebridService>,
    ) -> Self {
        Self {
            store,
            providers,
            streams: StreamService::new(debrid.clone()),
            debrid,
            min_upgrade_points: DEFAULT_MIN_UPGRADE_POINTS,
            recheck_interval: Duration::hours(DEFAULT_RECHECK_HOURS),
            batch_size: MAX_BATCH_SIZE,
            filter: None,
            max_quality: u32::MAX,
            sort: SortSpec::default(),
        }
    }

    /// Score gain required before a stored stream is replaced.
    pub fn with_min_upgrade_points(mut self, points: i32) -> Self {
        self.min_upgrade_points = points;
        self
    }

    /// Delay until a rechecked stream is due again.
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    /// Hashes per cache-check call, clamped to 1..=100.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self.streams = StreamService::new(self.debrid.clone()).with_batch_size(self.batch_size);
        self
    }

    /// Drop candidates matching the release filter before any cache check.
    pub fn with_exclusion_filter(mut self, filter: Option<ExclusionFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Highest coarse quality (line count) a candidate may carry.
    pub fn with_max_quality(mut self, max_quality: u32) -> Self {
        self.max_quality = max_quality;
        self
    }

    /// Order used to break score ties between cached candidates.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Scan every library item for a first stream or an upgrade.
    ///
    /// Candidates are narrowed by the release filter and quality ceiling before
    /// the cache check. A stored stream is replaced by the best-ranked candidate
    /// that passes the upgrade rules, which need not be the top one.
    ///
    /// Items without an IMDb id are skipped. A failure on one item is counted
    /// and the scan moves on; only listing the library can fail the scan.
    pub async fn scan_and_upgrade(&self) -> Result<ScanReport, ScanError> {
        let media = self.store.list_media()?;
        let total = media.len();
        info!(total, "Starting library cache scan");

        let mut report = ScanReport::default();
        for (i, item) in media.iter().enumerate() {
            if i > 0 && i % 100 == 0 {
                info!(
                    progress = i,
                    total,
                    cached = report.cached,
                    upgraded = report.upgraded,
                    skipped = report.skipped,
                    "Scan progress"
                );
            }

            report.scanned += 1;
            match self.scan_item(item).await {
                Ok(outcome) => {
                    metrics::SCAN_ITEMS
                        .with_label_values(&[outcome.as_str()])
                        .inc();
                    match outcome {
                        ItemOutcome::Cached => report.cached += 1,
                        ItemOutcome::Upgraded => report.upgraded += 1,
                        ItemOutcome::Skipped => report.skipped += 1,
                    }
                }
                Err(e) => {
                    metrics::SCAN_ITEMS.with_label_values(&["error"]).inc();
                    warn!(media_id = item.id, title = %item.title, error = %e, "Scan failed for item");
                    report.errors += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            cached = report.cached,
            upgraded = report.upgraded,
            skipped = report.skipped,
            errors = report.errors,
            "Library cache scan complete"
        );
        Ok(report)
    }

    async fn scan_item(&self, item: &MediaItem) -> Result<ItemOutcome, ScanError> {
        let Some(request) = item.request() else {
            debug!(media_id = item.id, "No IMDb id, skipping");
            return Ok(ItemOutcome::Skipped);
        };

        let existing = self.store.get_cached_stream(item.id)?;

        let candidates = self.eligible(self.providers.streams(&request).await?);
        if candidates.is_empty() {
            debug!(media_id = item.id, request = %request, "No eligible streams from providers");
            return Ok(ItemOutcome::Skipped);
        }

        let ranked = self.streams.top_n_streams(candidates, usize::MAX).await?;
        let Some(best) = ranked.first() else {
            warn!(media_id = item.id, "No debrid-cached streams available");
            return Ok(ItemOutcome::Skipped);
        };

        let Some(current) = existing else {
            self.store
                .cache_stream(item.id, &StreamRecord::from_ranked(best))?;
            info!(
                title = %item.title,
                resolution = %best.quality.resolution,
                score = best.total_score(),
                "Cached stream"
            );
            return Ok(ItemOutcome::Cached);
        };

        // The top candidate may be held back while a lower one still qualifies.
        // Nothing ranked below the stored stream is considered.
        let current_grade = current.grade();
        let upgrade = ranked
            .iter()
            .take_while(|c| !current.record.stream_hash.eq_ignore_ascii_case(c.info_hash()))
            .find(|c| should_upgrade(&current_grade, &c.grade(), self.min_upgrade_points));
        if let Some(upgrade) = upgrade {
            self.store
                .cache_stream(item.id, &StreamRecord::from_ranked(upgrade))?;
            info!(
                title = %item.title,
                from_resolution = %current.record.resolution,
                to_resolution = %upgrade.quality.resolution,
                from_score = current.record.quality_score,
                to_score = upgrade.total_score(),
                "Upgraded stream"
            );
            return Ok(ItemOutcome::Upgraded);
        }

        // Better on score but held back; leave it for review
        if !current.record.stream_hash.eq_ignore_ascii_case(best.info_hash())
            && best.total_score() > current.record.quality_score
            && !current.upgrade_available
        {
            self.store.set_upgrade_available(item.id, true)?;
            debug!(
                media_id = item.id,
                current = current.record.quality_score,
                candidate = best.total_score(),
                "Upgrade held back"
            );
        }
        Ok(ItemOutcome::Skipped)
    }

    /// Apply the release filter and quality ceiling, then order by the sort keys.
    fn eligible(&self, candidates: Vec<StreamCandidate>) -> Vec<StreamCandidate> {
        let total = candidates.len();
        let mut kept: Vec<StreamCandidate> = candidates
            .into_iter()
            .filter(|s| !self.filter.as_ref().is_some_and(|f| f.excludes(s)))
            .filter(|s| parse_quality_int(&s.quality) <= self.max_quality)
            .collect();
        if kept.len() < total {
            debug!(total, kept = kept.len(), max_quality = self.max_quality, "Filtered scan candidates");
        }
        self.sort.sort(&mut kept);
        kept
    }

    /// Re-verify every stream last checked before `older_than`.
    ///
    /// Hashes are checked in batches; a failed batch fails the recheck. Streams
    /// without a hash are recorded as unavailable.
    pub async fn recheck_availability(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<RecheckReport, ScanError> {
        let due = self.store.streams_checked_before(older_than)?;
        if due.is_empty() {
            debug!("No streams due for recheck");
            return Ok(RecheckReport::default());
        }

        let mut seen: HashSet<String> = HashSet::new();
        let hashes: Vec<String> = due
            .iter()
            .map(|s| s.record.stream_hash.to_lowercase())
            .filter(|h| !h.is_empty() && seen.insert(h.clone()))
            .collect();

        let mut cached: HashMap<String, bool> = HashMap::with_capacity(hashes.len());
        for batch in hashes.chunks(self.batch_size) {
            metrics::DEBRID_HASHES_CHECKED.inc_by(batch.len() as u64);
            let result = self.debrid.check_cache(batch).await;
            let outcome = if result.is_ok() { "success" } else { "error" };
            metrics::DEBRID_CHECK_BATCHES
                .with_label_values(&[outcome])
                .inc();
            cached.extend(result?.into_iter().map(|(h, c)| (h.to_lowercase(), c)));
        }

        let now = Utc::now();
        let next_check = Some(now + self.recheck_interval);
        let mut report = RecheckReport::default();

        for stream in &due {
            let available = cached
                .get(&stream.record.stream_hash.to_lowercase())
                .copied()
                .unwrap_or(false);
            self.store
                .mark_checked(stream.media_id, available, now, next_check)?;

            report.checked += 1;
            if available {
                report.available += 1;
            } else {
                report.unavailable += 1;
                if stream.is_available {
                    warn!(media_id = stream.media_id, hash = %stream.record.stream_hash, "Stream no longer cached");
                }
            }
        }

        info!(
            checked = report.checked,
            available = report.available,
            unavailable = report.unavailable,
            "Availability recheck complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseFilters;
    use crate::provider::{MediaRequest, StreamProvider};
    use crate::quality::Resolution;
    use crate::store::SqliteStreamStore;
    use crate::testing::{fixtures, MockDebridService, MockStreamProvider};

    struct Harness {
        store: Arc<SqliteStreamStore>,
        provider: Arc<MockStreamProvider>,
        debrid: Arc<MockDebridService>,
        scanner: CacheScanner,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteStreamStore::in_memory().unwrap());
        let provider = Arc::new(MockStreamProvider::new("mock"));
        let debrid = Arc::new(MockDebridService::new());
        let providers = Arc::new(MultiProvider::new(
            vec![provider.clone() as Arc<dyn StreamProvider>],
            std::time::Duration::from_secs(1),
        ));
        let scanner = CacheScanner::new(store.clone(), providers, debrid.clone());
        Harness {
            store,
            provider,
            debrid,
            scanner,
        }
    }

    fn seed(h: &Harness, title: &str, imdb: &str, release: &str, hash: &str) -> i64 {
        let id = h.store.upsert_media(&fixtures::movie(title, imdb)).unwrap();
        let ranked = crate::streams::parse_stream(release, hash, "mock", 0);
        h.store
            .cache_stream(id, &StreamRecord::from_ranked(&ranked))
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_caches_best_confirmed_stream() {
        let h = harness();
        let id = h.store.upsert_media(&fixtures::movie("Movie", "tt1")).unwrap();
        h.provider
            .set_streams(vec![
                fixtures::titled_stream("Movie.1080p.WEB-DL", "aaa"),
                fixtures::titled_stream("Movie.2160p.REMUX", "bbb"),
            ])
            .await;
        h.debrid.set_cached(&["aaa"]).await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.cached, 1);

        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "aaa");
        assert_eq!(stored.record.resolution, Resolution::P1080);
        assert_eq!(stored.record.indexer, "test");
    }

    #[tokio::test]
    async fn test_upgrades_when_improvement_is_enough() {
        let h = harness();
        let id = seed(&h, "Movie", "tt1", "Movie.1080p.WEB-DL", "aaa");
        h.provider
            .set_streams(vec![fixtures::titled_stream("Movie.2160p.REMUX", "bbb")])
            .await;
        h.debrid.set_cached(&["bbb"]).await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.upgraded, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "bbb");
        assert_eq!(stored.record.quality_score, 60);
    }

    #[tokio::test]
    async fn test_small_improvement_is_skipped() {
        let h = harness();
        let id = seed(&h, "Movie", "tt1", "Movie.1080p.WEB-DL", "aaa");
        h.provider
            .set_streams(vec![fixtures::titled_stream("Movie.1080p.BluRay", "bbb")])
            .await;
        h.debrid.set_cached(&["bbb"]).await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.skipped, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "aaa");
        assert!(stored.upgrade_available);
    }

    #[tokio::test]
    async fn test_resolution_ratchet_blocks_higher_score() {
        let h = harness();
        let id = seed(&h, "Movie", "tt1", "Movie.2160p.WEB-DL", "aaa");
        h.provider
            .set_streams(vec![fixtures::titled_stream(
                "Movie.1080p.REMUX.TrueHD.Atmos",
                "bbb",
            )])
            .await;
        h.debrid.set_cached(&["bbb"]).await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.upgraded, 0);
        assert_eq!(report.skipped, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.resolution, Resolution::P2160);
    }

    #[tokio::test]
    async fn test_upgrade_walks_past_held_back_candidate() {
        let h = harness();
        let id = seed(&h, "Movie", "tt1", "Movie.2160p.WEB-DL", "cur");
        h.provider
            .set_streams(vec![
                // Scores higher but would give up 2160p
                fixtures::titled_stream("Movie.1080p.DV.REMUX.TrueHD.Atmos", "aaa"),
                fixtures::titled_stream("Movie.2160p.HDR10.REMUX", "bbb"),
            ])
            .await;
        h.debrid.set_cached(&["aaa", "bbb"]).await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.upgraded, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "bbb");
        assert_eq!(stored.record.resolution, Resolution::P2160);
    }

    #[tokio::test]
    async fn test_candidates_ranked_below_current_are_ignored() {
        let h = harness();
        let scanner = CacheScanner::new(
            h.store.clone(),
            Arc::new(MultiProvider::new(
                vec![h.provider.clone() as Arc<dyn StreamProvider>],
                std::time::Duration::from_secs(1),
            )),
            h.debrid.clone(),
        )
        .with_min_upgrade_points(0);
        let id = seed(&h, "Movie", "tt1", "Movie.1080p.WEB-DL", "cur");
        h.provider
            .set_streams(vec![
                fixtures::titled_stream("Movie.1080p.WEB-DL", "cur"),
                fixtures::titled_stream("Movie.1080p.WEB-DL", "aaa"),
            ])
            .await;
        h.debrid.set_cached(&["cur", "aaa"]).await;

        let report = scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.skipped, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "cur");
        assert!(!stored.upgrade_available);
    }

    #[tokio::test]
    async fn test_excluded_and_oversized_candidates_are_never_stored() {
        let h = harness();
        let filters = ReleaseFilters {
            enabled: true,
            excluded_qualities: "CAM".to_string(),
            excluded_groups: "BADGRP".to_string(),
            ..Default::default()
        };
        let scanner = CacheScanner::new(
            h.store.clone(),
            Arc::new(MultiProvider::new(
                vec![h.provider.clone() as Arc<dyn StreamProvider>],
                std::time::Duration::from_secs(1),
            )),
            h.debrid.clone(),
        )
        .with_exclusion_filter(ExclusionFilter::from_filters(&filters))
        .with_max_quality(1080);

        let id = h.store.upsert_media(&fixtures::movie("Movie", "tt1")).unwrap();
        h.provider
            .set_streams(vec![
                fixtures::titled_stream("Movie.2160p.DV.REMUX.TrueHD.Atmos", "uhd"),
                fixtures::titled_stream("Movie.1080p.REMUX-BADGRP", "grp"),
                fixtures::titled_stream("Movie.1080p.CAM", "cam"),
                fixtures::titled_stream("Movie.1080p.WEB-DL", "web"),
            ])
            .await;
        h.debrid.set_cached(&["uhd", "grp", "cam", "web"]).await;

        let report = scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.cached, 1);
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "web");

        // Filtered streams never reach the debrid service
        let calls = h.debrid.check_calls().await;
        assert_eq!(calls, vec![vec!["web".to_string()]]);
    }

    #[tokio::test]
    async fn test_sort_order_breaks_score_ties() {
        let h = harness();
        let scanner = CacheScanner::new(
            h.store.clone(),
            Arc::new(MultiProvider::new(
                vec![h.provider.clone() as Arc<dyn StreamProvider>],
                std::time::Duration::from_secs(1),
            )),
            h.debrid.clone(),
        )
        .with_sort(SortSpec::parse("size", "smallest"));

        let id = h.store.upsert_media(&fixtures::movie("Movie", "tt1")).unwrap();
        let gib = 1024 * 1024 * 1024;
        h.provider
            .set_streams(vec![
                StreamCandidate {
                    size: 8 * gib,
                    ..fixtures::titled_stream("Movie.1080p.WEB-DL", "big")
                },
                StreamCandidate {
                    size: 2 * gib,
                    ..fixtures::titled_stream("Movie.1080p.WEB-DL", "small")
                },
            ])
            .await;
        h.debrid.set_cached(&["big", "small"]).await;

        scanner.scan_and_upgrade().await.unwrap();
        let stored = h.store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stored.record.stream_hash, "small");
    }

    #[tokio::test]
    async fn test_per_item_failures_are_counted() {
        let h = harness();
        h.store
            .upsert_media(&fixtures::untracked_media("Home Video"))
            .unwrap();
        h.store.upsert_media(&fixtures::movie("Down", "tt1")).unwrap();
        let ok = h.store.upsert_media(&fixtures::movie("Fine", "tt2")).unwrap();

        h.provider
            .set_streams(vec![fixtures::titled_stream("Fine.720p", "ccc")])
            .await;
        h.debrid.set_cached(&["ccc"]).await;
        h.provider
            .set_streams_for(&MediaRequest::movie("tt1"), Vec::new())
            .await;

        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.cached, 1);
        assert!(h.store.get_cached_stream(ok).unwrap().is_some());

        h.provider.set_failure("down").await;
        let report = h.scanner.scan_and_upgrade().await.unwrap();
        assert_eq!(report.errors, 2);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_recheck_availability() {
        let h = harness();
        let kept = seed(&h, "A", "tt1", "A.1080p", "aaa");
        let lost = seed(&h, "B", "tt2", "B.1080p", "bbb");
        let fresh = seed(&h, "C", "tt3", "C.1080p", "ccc");

        let past = Utc::now() - Duration::days(3);
        h.store.mark_checked(kept, true, past, None).unwrap();
        h.store.mark_checked(lost, true, past, None).unwrap();
        h.debrid.set_cached(&["aaa"]).await;

        let report = h
            .scanner
            .recheck_availability(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.available, 1);
        assert_eq!(report.unavailable, 1);

        let calls = h.debrid.check_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);

        let lost = h.store.get_cached_stream(lost).unwrap().unwrap();
        assert!(!lost.is_available);
        assert_eq!(lost.check_count, 2);
        assert!(lost.next_check_at.is_some());

        let fresh = h.store.get_cached_stream(fresh).unwrap().unwrap();
        assert_eq!(fresh.check_count, 0);
    }

    #[tokio::test]
    async fn test_recheck_failure_propagates() {
        let h = harness();
        let id = seed(&h, "A", "tt1", "A.1080p", "aaa");
        h.store
            .mark_checked(id, true, Utc::now() - Duration::days(3), None)
            .unwrap();
        h.debrid.set_failure("down").await;

        let result = h
            .scanner
            .recheck_availability(Utc::now() - Duration::days(1))
            .await;
        assert!(matches!(result, Err(ScanError::Debrid(_))));
    }
}
