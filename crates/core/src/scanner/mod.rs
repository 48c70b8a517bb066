//! Cache scanner - background maintenance of the stored streams.
//!
//! A scan walks the library, caches a first stream for items that have none and
//! replaces stored streams when a sufficiently better one is cached. A recheck
//! re-verifies that stored streams are still in the debrid cache.

mod cache_scanner;

pub use cache_scanner::CacheScanner;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debrid::DebridError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use crate::streams::StreamError;

/// Totals from one library scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned: usize,
    /// Items that got their first stream.
    pub cached: usize,
    pub upgraded: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Totals from one availability recheck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecheckReport {
    pub checked: usize,
    pub available: usize,
    pub unavailable: usize,
}

/// Errors from scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Debrid error: {0}")]
    Debrid(#[from] DebridError),
}
