//! Time-bounded caching shared by provider lookups and debrid link resolution.

mod ttl;

pub use ttl::{Clock, ManualClock, SystemClock, TtlCache};
