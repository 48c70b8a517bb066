//! Debrid-cache filter and ranker.
//!
//! Narrows aggregated candidates to those the debrid service confirms as cached,
//! then ranks them by quality score. Also hosts the pure helpers used by library
//! maintenance: minimum-quality filtering, resolution grouping, substring
//! exclusions and the upgrade decision.

mod service;
mod types;

pub use service::{
    filter_by_minimum_quality, group_by_resolution, parse_stream, score_and_rank,
    should_filter_stream, should_upgrade, StreamService,
};
pub use types::*;
