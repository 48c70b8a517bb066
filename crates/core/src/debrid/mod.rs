//! Debrid service boundary.
//!
//! A `DebridService` trait for batched cache checks and playback-URL resolution,
//! the Real-Debrid client behind a token-bucket limiter, and a TTL-cached resolver.

mod rate_limiter;
mod realdebrid;
mod resolver;
mod types;

pub use rate_limiter::{RateLimitStatus, RateLimiter, TokenBucket};
pub use realdebrid::{RealDebridClient, MAX_BATCH_SIZE};
pub use resolver::StreamUrlResolver;
pub use types::*;
