//! Testing utilities and mock implementations.
//!
//! Mocks for the provider and debrid boundaries, plus fixtures, so the
//! selection pipeline can be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamarr_core::testing::{MockDebridService, MockStreamProvider, fixtures};
//!
//! let provider = MockStreamProvider::new("torrentio");
//! let debrid = MockDebridService::new();
//!
//! provider.set_streams(vec![fixtures::titled_stream("Movie.2160p.REMUX", "abc")]).await;
//! debrid.set_cached(&["abc"]).await;
//! ```

mod mock_debrid;
mod mock_provider;

pub use crate::cache::ManualClock;
pub use mock_debrid::MockDebridService;
pub use mock_provider::MockStreamProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::provider::StreamCandidate;
    use crate::store::NewMedia;

    /// A provider-claimed cached stream whose title equals its name.
    pub fn stream(name: &str, info_hash: &str, quality: &str) -> StreamCandidate {
        StreamCandidate {
            name: name.to_string(),
            title: name.to_string(),
            info_hash: info_hash.to_string(),
            url: format!("https://addon.test/resolve/{}", info_hash),
            source: "test".to_string(),
            cached: true,
            quality: quality.to_string(),
            ..Default::default()
        }
    }

    /// Same as [`stream`] but not claimed cached.
    pub fn uncached_stream(name: &str, info_hash: &str, quality: &str) -> StreamCandidate {
        StreamCandidate {
            cached: false,
            ..stream(name, info_hash, quality)
        }
    }

    /// A stream named after a release title, with the coarse quality taken from it.
    pub fn titled_stream(title: &str, info_hash: &str) -> StreamCandidate {
        let quality = crate::quality::parse_quality(title).resolution.to_string();
        StreamCandidate {
            name: "[RD+] Test".to_string(),
            ..stream(title, info_hash, &quality)
        }
    }

    /// A movie with an IMDb id.
    pub fn movie(title: &str, imdb_id: &str) -> NewMedia {
        NewMedia {
            title: title.to_string(),
            imdb_id: Some(imdb_id.to_string()),
            season: None,
            episode: None,
        }
    }

    /// A library item without an IMDb id.
    pub fn untracked_media(title: &str) -> NewMedia {
        NewMedia {
            title: title.to_string(),
            imdb_id: None,
            season: None,
            episode: None,
        }
    }
}
