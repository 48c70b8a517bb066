//! SQLite-backed stream store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    LibraryEntry, LibraryStats, MediaItem, NewMedia, PersistedStream, StoreError, StreamRecord,
    StreamStore, LOW_QUALITY_SCORE, STALE_AFTER_DAYS,
};
use crate::quality::{AudioFormat, Codec, HdrType, Resolution, SourceType};

const STREAM_COLUMNS: &str = "media_id, stream_url, stream_hash, quality_score, resolution, hdr_type,
     audio_format, source_type, codec, file_size_gb, indexer, cached_at, last_checked,
     check_count, is_available, upgrade_available, next_check_at";

/// Fixed-width timestamps so they compare correctly as text.
fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-backed stream store.
pub struct SqliteStreamStore {
    conn: Mutex<Connection>,
}

impl SqliteStreamStore {
    /// Open a store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Library items
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                imdb_id TEXT,
                season INTEGER,
                episode INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_media_imdb ON media(imdb_id);

            -- The chosen cached stream (at most one per media item)
            CREATE TABLE IF NOT EXISTS media_streams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media_id INTEGER NOT NULL UNIQUE REFERENCES media(id) ON DELETE CASCADE,
                stream_url TEXT NOT NULL,
                stream_hash TEXT NOT NULL,
                quality_score INTEGER NOT NULL,
                resolution TEXT NOT NULL,
                hdr_type TEXT NOT NULL,
                audio_format TEXT NOT NULL,
                source_type TEXT NOT NULL,
                codec TEXT NOT NULL,
                file_size_gb REAL NOT NULL DEFAULT 0,
                indexer TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                last_checked TEXT NOT NULL,
                check_count INTEGER NOT NULL DEFAULT 0,
                is_available INTEGER NOT NULL DEFAULT 1,
                upgrade_available INTEGER NOT NULL DEFAULT 0,
                next_check_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_media_streams_hash ON media_streams(stream_hash);
            CREATE INDEX IF NOT EXISTS idx_media_streams_last_checked ON media_streams(last_checked);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaItem> {
        Ok(MediaItem {
            id: row.get(0)?,
            title: row.get(1)?,
            imdb_id: row.get(2)?,
            season: row.get(3)?,
            episode: row.get(4)?,
        })
    }

    /// Convert a row selected with [`STREAM_COLUMNS`].
    ///
    /// Labels that no longer parse fall back to the lowest tier.
    fn row_to_stream(row: &rusqlite::Row) -> rusqlite::Result<PersistedStream> {
        let resolution: String = row.get(4)?;
        let hdr_type: String = row.get(5)?;
        let audio_format: String = row.get(6)?;
        let source_type: String = row.get(7)?;
        let codec: String = row.get(8)?;
        let cached_at: String = row.get(11)?;
        let last_checked: String = row.get(12)?;
        let next_check_at: Option<String> = row.get(16)?;

        Ok(PersistedStream {
            media_id: row.get(0)?,
            record: StreamRecord {
                stream_url: row.get(1)?,
                stream_hash: row.get(2)?,
                quality_score: row.get(3)?,
                resolution: resolution.parse().unwrap_or(Resolution::Sd),
                hdr_type: hdr_type.parse().unwrap_or(HdrType::Sdr),
                audio_format: audio_format.parse().unwrap_or(AudioFormat::Unknown),
                source_type: source_type.parse().unwrap_or(SourceType::Unknown),
                codec: codec.parse().unwrap_or(Codec::Unknown),
                file_size_gb: row.get(9)?,
                indexer: row.get(10)?,
            },
            cached_at: from_db_time(&cached_at),
            last_checked: from_db_time(&last_checked),
            check_count: row.get(13)?,
            is_available: row.get(14)?,
            upgrade_available: row.get(15)?,
            next_check_at: next_check_at.as_deref().map(from_db_time),
        })
    }

    fn query_streams(
        conn: &Connection,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<PersistedStream>, StoreError> {
        let sql = format!(
            "SELECT {} FROM media_streams {} ORDER BY media_id",
            STREAM_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::row_to_stream)?;

        let mut streams = Vec::new();
        for row in rows {
            streams.push(row?);
        }
        Ok(streams)
    }

    fn distribution(
        conn: &Connection,
        column: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let sql = format!(
            "SELECT {0}, COUNT(*) FROM media_streams GROUP BY {0}",
            column
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let label: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((label, count as u64))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (label, count) = row?;
            counts.insert(label, count);
        }
        Ok(counts)
    }
}

impl StreamStore for SqliteStreamStore {
    fn upsert_media(&self, media: &NewMedia) -> Result<i64, StoreError> {
        let conn = self.lock()?;

        if let Some(imdb_id) = media.imdb_id.as_deref() {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM media WHERE imdb_id = ? AND season IS ? AND episode IS ?",
                    params![imdb_id, media.season, media.episode],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                conn.execute(
                    "UPDATE media SET title = ? WHERE id = ?",
                    params![&media.title, id],
                )?;
                return Ok(id);
            }
        }

        conn.execute(
            "INSERT INTO media (title, imdb_id, season, episode, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                &media.title,
                &media.imdb_id,
                media.season,
                media.episode,
                to_db_time(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_media(&self) -> Result<Vec<MediaItem>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, title, imdb_id, season, episode FROM media ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_to_media)?;

        let mut media = Vec::new();
        for row in rows {
            media.push(row?);
        }
        Ok(media)
    }

    fn get_cached_stream(&self, media_id: i64) -> Result<Option<PersistedStream>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM media_streams WHERE media_id = ?",
            STREAM_COLUMNS
        );
        let stream = conn
            .query_row(&sql, params![media_id], Self::row_to_stream)
            .optional()?;
        Ok(stream)
    }

    fn cache_stream(&self, media_id: i64, record: &StreamRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM media WHERE id = ?",
                params![media_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::MediaNotFound(media_id));
        }

        let now = to_db_time(&Utc::now());

        // cached_at is kept on replacement
        conn.execute(
            "INSERT INTO media_streams (media_id, stream_url, stream_hash, quality_score, resolution,
                 hdr_type, audio_format, source_type, codec, file_size_gb, indexer, cached_at,
                 last_checked, check_count, is_available, upgrade_available, next_check_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1, 0, NULL)
             ON CONFLICT(media_id) DO UPDATE SET
                stream_url = excluded.stream_url,
                stream_hash = excluded.stream_hash,
                quality_score = excluded.quality_score,
                resolution = excluded.resolution,
                hdr_type = excluded.hdr_type,
                audio_format = excluded.audio_format,
                source_type = excluded.source_type,
                codec = excluded.codec,
                file_size_gb = excluded.file_size_gb,
                indexer = excluded.indexer,
                last_checked = excluded.last_checked,
                is_available = 1,
                upgrade_available = 0",
            params![
                media_id,
                &record.stream_url,
                record.stream_hash.to_lowercase(),
                record.quality_score,
                record.resolution.as_str(),
                record.hdr_type.as_str(),
                record.audio_format.as_str(),
                record.source_type.as_str(),
                record.codec.as_str(),
                record.file_size_gb,
                &record.indexer,
                &now,
                &now,
            ],
        )?;

        Ok(())
    }

    fn delete_stream(&self, media_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM media_streams WHERE media_id = ?",
            params![media_id],
        )?;
        Ok(deleted > 0)
    }

    fn list_streams(&self) -> Result<Vec<PersistedStream>, StoreError> {
        let conn = self.lock()?;
        Self::query_streams(&conn, "", [])
    }

    fn streams_checked_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PersistedStream>, StoreError> {
        let conn = self.lock()?;
        Self::query_streams(
            &conn,
            "WHERE last_checked < ?",
            params![to_db_time(&cutoff)],
        )
    }

    fn list_available_entries(&self) -> Result<Vec<LibraryEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ms.media_id, COALESCE(m.title, ''), ms.stream_hash, ms.quality_score
             FROM media_streams ms
             JOIN media m ON ms.media_id = m.id
             WHERE ms.is_available = 1
             ORDER BY ms.media_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LibraryEntry {
                media_id: row.get(0)?,
                title: row.get(1)?,
                stream_hash: row.get(2)?,
                quality_score: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn mark_checked(
        &self,
        media_id: i64,
        is_available: bool,
        checked_at: DateTime<Utc>,
        next_check_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_streams
             SET is_available = ?, last_checked = ?, check_count = check_count + 1, next_check_at = ?
             WHERE media_id = ?",
            params![
                is_available,
                to_db_time(&checked_at),
                next_check_at.as_ref().map(to_db_time),
                media_id,
            ],
        )?;
        Ok(())
    }

    fn set_upgrade_available(&self, media_id: i64, available: bool) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_streams SET upgrade_available = ? WHERE media_id = ?",
            params![available, media_id],
        )?;
        Ok(())
    }

    fn library_stats(&self, now: DateTime<Utc>) -> Result<LibraryStats, StoreError> {
        let conn = self.lock()?;
        let stale_cutoff = to_db_time(&(now - Duration::days(STALE_AFTER_DAYS)));

        let total_media: i64 =
            conn.query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;

        let (streams, available, upgrades, average, stale, low_quality): (
            i64,
            i64,
            i64,
            Option<f64>,
            i64,
            i64,
        ) = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(is_available = 1), 0),
                COALESCE(SUM(upgrade_available = 1), 0),
                AVG(quality_score),
                COALESCE(SUM(last_checked < ?1), 0),
                COALESCE(SUM(quality_score < ?2), 0)
             FROM media_streams",
            params![stale_cutoff, LOW_QUALITY_SCORE],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        let total_media = total_media as u64;
        let media_with_streams = streams as u64;

        Ok(LibraryStats {
            total_media,
            media_with_streams,
            media_without_streams: total_media.saturating_sub(media_with_streams),
            available_streams: available as u64,
            unavailable_streams: (streams - available) as u64,
            upgrades_available: upgrades as u64,
            average_score: average.unwrap_or(0.0),
            stale_streams: stale as u64,
            low_quality_streams: low_quality as u64,
            by_resolution: Self::distribution(&conn, "resolution")?,
            by_source: Self::distribution(&conn, "source_type")?,
            by_hdr: Self::distribution(&conn, "hdr_type")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::parse_stream;
    use crate::testing::fixtures;

    fn record(title: &str, hash: &str) -> StreamRecord {
        let mut ranked = parse_stream(title, hash, "torrentio", 0);
        ranked.stream.url = format!("https://addon.test/resolve/{}", hash);
        StreamRecord::from_ranked(&ranked)
    }

    fn store_with_movie() -> (SqliteStreamStore, i64) {
        let store = SqliteStreamStore::in_memory().unwrap();
        let id = store
            .upsert_media(&fixtures::movie("The Matrix", "tt0133093"))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_upsert_media_is_keyed_by_imdb_coordinates() {
        let store = SqliteStreamStore::in_memory().unwrap();
        let first = store
            .upsert_media(&fixtures::movie("Matrix", "tt0133093"))
            .unwrap();
        let again = store
            .upsert_media(&fixtures::movie("The Matrix", "tt0133093"))
            .unwrap();
        assert_eq!(first, again);

        let episode = store
            .upsert_media(&NewMedia {
                season: Some(1),
                episode: Some(1),
                ..fixtures::movie("Show", "tt0133093")
            })
            .unwrap();
        assert_ne!(first, episode);

        // Without an id every call inserts
        let a = store.upsert_media(&fixtures::untracked_media("Home Video")).unwrap();
        let b = store.upsert_media(&fixtures::untracked_media("Home Video")).unwrap();
        assert_ne!(a, b);

        let media = store.list_media().unwrap();
        assert_eq!(media.len(), 4);
        assert_eq!(media[0].title, "The Matrix");
        assert!(media[2].request().is_none());
    }

    #[test]
    fn test_cache_and_get_stream() {
        let (store, id) = store_with_movie();
        assert!(store.get_cached_stream(id).unwrap().is_none());

        store
            .cache_stream(id, &record("Matrix.1999.2160p.DV.REMUX.TrueHD.Atmos", "ABC"))
            .unwrap();

        let stream = store.get_cached_stream(id).unwrap().unwrap();
        assert_eq!(stream.record.stream_hash, "abc");
        assert_eq!(stream.record.resolution, Resolution::P2160);
        assert_eq!(stream.record.hdr_type, HdrType::DolbyVision);
        assert_eq!(stream.record.quality_score, 90);
        assert!(stream.is_available);
        assert!(!stream.upgrade_available);
        assert_eq!(stream.check_count, 0);
    }

    #[test]
    fn test_cache_stream_replaces_and_keeps_cached_at() {
        let (store, id) = store_with_movie();
        store.cache_stream(id, &record("Matrix.1080p.WEB-DL", "aaa")).unwrap();
        let original = store.get_cached_stream(id).unwrap().unwrap();

        store.set_upgrade_available(id, true).unwrap();
        store.mark_checked(id, false, Utc::now(), None).unwrap();

        store.cache_stream(id, &record("Matrix.2160p.REMUX", "bbb")).unwrap();
        let replaced = store.get_cached_stream(id).unwrap().unwrap();

        assert_eq!(replaced.record.stream_hash, "bbb");
        assert_eq!(replaced.cached_at, original.cached_at);
        assert!(replaced.is_available);
        assert!(!replaced.upgrade_available);
        assert_eq!(store.list_streams().unwrap().len(), 1);
    }

    #[test]
    fn test_cache_stream_requires_media() {
        let store = SqliteStreamStore::in_memory().unwrap();
        let err = store
            .cache_stream(42, &record("Movie.1080p", "aaa"))
            .unwrap_err();
        assert!(matches!(err, StoreError::MediaNotFound(42)));
    }

    #[test]
    fn test_delete_stream() {
        let (store, id) = store_with_movie();
        store.cache_stream(id, &record("Matrix.1080p", "aaa")).unwrap();

        assert!(store.delete_stream(id).unwrap());
        assert!(!store.delete_stream(id).unwrap());
        assert!(store.get_cached_stream(id).unwrap().is_none());
    }

    #[test]
    fn test_mark_checked_and_available_entries() {
        let (store, id) = store_with_movie();
        let other = store
            .upsert_media(&fixtures::movie("Heat", "tt0113277"))
            .unwrap();
        store.cache_stream(id, &record("Matrix.1080p", "aaa")).unwrap();
        store.cache_stream(other, &record("Heat.720p", "bbb")).unwrap();

        let next = Utc::now() + Duration::hours(24);
        store.mark_checked(other, false, Utc::now(), Some(next)).unwrap();

        let stream = store.get_cached_stream(other).unwrap().unwrap();
        assert!(!stream.is_available);
        assert_eq!(stream.check_count, 1);
        assert!(stream.next_check_at.is_some());

        let entries = store.list_available_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "The Matrix");
        assert_eq!(entries[0].stream_hash, "aaa");
    }

    #[test]
    fn test_streams_checked_before() {
        let (store, id) = store_with_movie();
        store.cache_stream(id, &record("Matrix.1080p", "aaa")).unwrap();

        let past = Utc::now() - Duration::days(3);
        store.mark_checked(id, true, past, None).unwrap();

        let due = store
            .streams_checked_before(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(due.len(), 1);

        let due = store
            .streams_checked_before(Utc::now() - Duration::days(7))
            .unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_library_stats() {
        let (store, id) = store_with_movie();
        let heat = store
            .upsert_media(&fixtures::movie("Heat", "tt0113277"))
            .unwrap();
        store
            .upsert_media(&fixtures::movie("Alien", "tt0078748"))
            .unwrap();

        store
            .cache_stream(id, &record("Matrix.2160p.DV.REMUX.TrueHD.Atmos", "aaa"))
            .unwrap();
        store.cache_stream(heat, &record("Heat.720p.HDTV", "bbb")).unwrap();
        store
            .mark_checked(heat, false, Utc::now() - Duration::days(30), None)
            .unwrap();
        store.set_upgrade_available(heat, true).unwrap();

        let stats = store.library_stats(Utc::now()).unwrap();
        assert_eq!(stats.total_media, 3);
        assert_eq!(stats.media_with_streams, 2);
        assert_eq!(stats.media_without_streams, 1);
        assert_eq!(stats.available_streams, 1);
        assert_eq!(stats.unavailable_streams, 1);
        assert_eq!(stats.upgrades_available, 1);
        assert_eq!(stats.stale_streams, 1);
        assert_eq!(stats.low_quality_streams, 1);
        // (90 + 20) / 2
        assert!((stats.average_score - 55.0).abs() < 1e-9);
        assert_eq!(stats.by_resolution.get("2160p"), Some(&1));
        assert_eq!(stats.by_resolution.get("720p"), Some(&1));
        assert_eq!(stats.by_hdr.get("DV"), Some(&1));
        assert_eq!(stats.by_source.get("REMUX"), Some(&1));
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.db");

        {
            let store = SqliteStreamStore::new(&path).unwrap();
            let id = store
                .upsert_media(&fixtures::movie("The Matrix", "tt0133093"))
                .unwrap();
            store.cache_stream(id, &record("Matrix.1080p", "aaa")).unwrap();
        }

        let store = SqliteStreamStore::new(&path).unwrap();
        assert_eq!(store.list_streams().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_library_stats() {
        let store = SqliteStreamStore::in_memory().unwrap();
        let stats = store.library_stats(Utc::now()).unwrap();
        assert_eq!(stats, LibraryStats::default());
    }
}
