//! Stream store - the chosen cached stream for each library item.
//!
//! Each media item has at most one persisted stream. The cache scanner writes
//! it; playback and duplicate detection read it.

mod sqlite;
mod types;

pub use sqlite::SqliteStreamStore;
pub use types::*;

use chrono::{DateTime, Utc};

/// Trait for stream storage.
pub trait StreamStore: Send + Sync {
    /// Add a library item, or update the title of the one with the same
    /// IMDb id, season and episode. Returns the item id.
    fn upsert_media(&self, media: &NewMedia) -> Result<i64, StoreError>;

    /// All library items, ordered by id.
    fn list_media(&self) -> Result<Vec<MediaItem>, StoreError>;

    /// The stream stored for a media item, if any.
    fn get_cached_stream(&self, media_id: i64) -> Result<Option<PersistedStream>, StoreError>;

    /// Store or replace the stream for a media item.
    ///
    /// On replacement `cached_at` is preserved, the stream is marked available
    /// and any pending upgrade flag is cleared.
    fn cache_stream(&self, media_id: i64, record: &StreamRecord) -> Result<(), StoreError>;

    /// Remove the stream for a media item. Returns whether a row was removed.
    fn delete_stream(&self, media_id: i64) -> Result<bool, StoreError>;

    /// Every stored stream, ordered by media id.
    fn list_streams(&self) -> Result<Vec<PersistedStream>, StoreError>;

    /// Streams last checked before `cutoff`.
    fn streams_checked_before(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<PersistedStream>, StoreError>;

    /// Available streams joined with their media titles.
    fn list_available_entries(&self) -> Result<Vec<LibraryEntry>, StoreError>;

    /// Record an availability check.
    fn mark_checked(
        &self,
        media_id: i64,
        is_available: bool,
        checked_at: DateTime<Utc>,
        next_check_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Flag that a better release exists but was not applied.
    fn set_upgrade_available(&self, media_id: i64, available: bool) -> Result<(), StoreError>;

    /// Library-wide statistics as of `now`.
    fn library_stats(&self, now: DateTime<Utc>) -> Result<LibraryStats, StoreError>;
}
