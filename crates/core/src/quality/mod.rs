//! Release quality parsing and scoring.
//!
//! Both halves are pure functions: [`parse_quality`] turns a free-text release
//! title into a [`ParsedQuality`], and [`score_quality`] maps that onto a fixed
//! point table to produce a [`QualityScore`].

mod parser;
mod scorer;
mod types;

pub use parser::{extract_size_gb, parse_quality};
pub use scorer::{
    audio_score, hdr_score, resolution_score, score_quality, seeders_score, size_penalty,
    source_score,
};
pub use types::*;
