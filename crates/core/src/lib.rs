pub mod cache;
pub mod config;
pub mod debrid;
pub mod duplicates;
pub mod metrics;
pub mod provider;
pub mod quality;
pub mod scanner;
pub mod store;
pub mod streams;
pub mod testing;

pub use cache::{Clock, SystemClock, TtlCache};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ReleaseFilters,
    SanitizedConfig,
};
pub use debrid::{DebridError, DebridService, RealDebridClient, StreamUrlResolver};
pub use duplicates::{DuplicateDetector, DuplicateError, DuplicateMatch, MatchType};
pub use provider::{
    build_providers, MediaRequest, MultiProvider, ProviderError, SortSpec, StreamCandidate,
    StreamProvider, StreamSelection,
};
pub use quality::{parse_quality, score_quality, ParsedQuality, QualityScore};
pub use scanner::{CacheScanner, RecheckReport, ScanError, ScanReport};
pub use store::{SqliteStreamStore, StoreError, StreamStore};
pub use streams::{should_upgrade, RankedStream, StreamError, StreamService};
