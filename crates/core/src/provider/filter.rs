//! Release exclusion and multi-key stream ordering.

use regex_lite::Regex;
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::warn;

use crate::config::{ReleaseFilters, SelectionConfig};

use super::StreamCandidate;

/// Compiled exclusion pattern built from [`ReleaseFilters`].
///
/// Matches case-insensitively on word boundaries against the stream name, title
/// and percent-decoded URL.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    pattern: Regex,
}

impl ExclusionFilter {
    /// Compile the filters. `None` when disabled, empty, or not a valid pattern.
    pub fn from_filters(filters: &ReleaseFilters) -> Option<Self> {
        if !filters.enabled {
            return None;
        }

        let parts: Vec<&str> = [
            &filters.excluded_qualities,
            &filters.excluded_groups,
            &filters.excluded_languages,
            &filters.excluded_custom,
        ]
        .into_iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

        if parts.is_empty() {
            return None;
        }

        let combined = format!(r"(?i)\b({})\b", parts.join("|"));
        match Regex::new(&combined) {
            Ok(pattern) => Some(Self { pattern }),
            Err(e) => {
                warn!(pattern = %combined, error = %e, "Ignoring invalid exclusion pattern");
                None
            }
        }
    }

    /// Whether the stream should be dropped.
    pub fn excludes(&self, stream: &StreamCandidate) -> bool {
        let haystack = format!(
            "{} {} {}",
            stream.name,
            stream.title,
            decode_url(&stream.url)
        );
        self.pattern.is_match(&haystack)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Query-unescape a URL: `+` becomes a space and percent escapes are decoded.
///
/// Falls back to the raw input when the escapes do not form valid UTF-8.
pub fn decode_url(url: &str) -> String {
    let spaced = url.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => url.to_string(),
    }
}

/// Map a coarse quality label to its line count: `4K`/`UHD` → 2160, `1080p` → 1080.
/// Anything unrecognised is 0.
pub fn parse_quality_int(quality: &str) -> u32 {
    let upper = quality.trim().to_uppercase();
    match upper.as_str() {
        "4K" | "UHD" => 2160,
        other => other
            .strip_suffix('P')
            .unwrap_or(other)
            .parse()
            .unwrap_or(0),
    }
}

/// A stream attribute usable as a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Quality,
    Size,
    Seeders,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "size" => Ok(Self::Size),
            "seeders" => Ok(Self::Seeders),
            other => Err(format!("unknown sort field: {}", other)),
        }
    }
}

/// Direction of every sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPreference {
    /// Highest quality, largest file, most seeders first.
    #[default]
    Best,
    /// Lowest quality, smallest known file, fewest seeders first.
    Smallest,
}

impl FromStr for SortPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "best" | "balanced" => Ok(Self::Best),
            "smallest" | "lowest" => Ok(Self::Smallest),
            other => Err(format!("unknown sort preference: {}", other)),
        }
    }
}

/// Ordered list of sort keys plus a preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub fields: Vec<SortField>,
    pub prefer: SortPreference,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            fields: vec![SortField::Quality, SortField::Size, SortField::Seeders],
            prefer: SortPreference::Best,
        }
    }
}

impl SortSpec {
    /// Parse a comma-separated field list and a preference.
    ///
    /// Unknown fields are skipped; an empty list or unknown preference falls back to the defaults.
    pub fn parse(order: &str, prefer: &str) -> Self {
        let mut fields: Vec<SortField> = order
            .split(',')
            .filter_map(|f| f.parse().ok())
            .collect();
        if fields.is_empty() {
            fields = Self::default().fields;
        }

        Self {
            fields,
            prefer: prefer.parse().unwrap_or_default(),
        }
    }

    /// Compare two streams; `Ordering::Less` means `a` sorts first.
    ///
    /// Keys are compared in turn until one differs. In smallest mode an unknown
    /// size (0) always sorts after every known size.
    pub fn compare(&self, a: &StreamCandidate, b: &StreamCandidate) -> Ordering {
        for field in &self.fields {
            let ord = match (field, self.prefer) {
                (SortField::Quality, SortPreference::Best) => {
                    parse_quality_int(&b.quality).cmp(&parse_quality_int(&a.quality))
                }
                (SortField::Quality, SortPreference::Smallest) => {
                    parse_quality_int(&a.quality).cmp(&parse_quality_int(&b.quality))
                }
                (SortField::Size, SortPreference::Best) => b.size.cmp(&a.size),
                (SortField::Size, SortPreference::Smallest) => known_size(a).cmp(&known_size(b)),
                (SortField::Seeders, SortPreference::Best) => b.seeders.cmp(&a.seeders),
                (SortField::Seeders, SortPreference::Smallest) => a.seeders.cmp(&b.seeders),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort, best first.
    pub fn sort(&self, streams: &mut [StreamCandidate]) {
        streams.sort_by(|a, b| self.compare(a, b));
    }
}

impl From<&SelectionConfig> for SortSpec {
    fn from(config: &SelectionConfig) -> Self {
        Self::parse(&config.sort_order, &config.sort_prefer)
    }
}

fn known_size(stream: &StreamCandidate) -> u64 {
    if stream.size == 0 {
        u64::MAX
    } else {
        stream.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(name: &str, quality: &str, size: u64, seeders: u32) -> StreamCandidate {
        StreamCandidate {
            name: name.to_string(),
            title: name.to_string(),
            quality: quality.to_string(),
            size,
            seeders,
            source: "test".to_string(),
            ..Default::default()
        }
    }

    fn filters(groups: &str) -> ReleaseFilters {
        ReleaseFilters {
            enabled: true,
            excluded_groups: groups.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_quality_int() {
        assert_eq!(parse_quality_int("2160p"), 2160);
        assert_eq!(parse_quality_int("4K"), 2160);
        assert_eq!(parse_quality_int("uhd"), 2160);
        assert_eq!(parse_quality_int("1080P"), 1080);
        assert_eq!(parse_quality_int("720p"), 720);
        assert_eq!(parse_quality_int("Unknown"), 0);
        assert_eq!(parse_quality_int(""), 0);
    }

    #[test]
    fn test_disabled_or_empty_filters_compile_to_none() {
        assert!(ExclusionFilter::from_filters(&ReleaseFilters::default()).is_none());
        let enabled_empty = ReleaseFilters {
            enabled: true,
            ..Default::default()
        };
        assert!(ExclusionFilter::from_filters(&enabled_empty).is_none());
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        assert!(ExclusionFilter::from_filters(&filters("(unclosed")).is_none());
    }

    #[test]
    fn test_exclusion_is_case_insensitive_on_word_boundaries() {
        let filter = ExclusionFilter::from_filters(&ReleaseFilters {
            enabled: true,
            excluded_qualities: "CAM|TS".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert!(filter.excludes(&stream("Movie.2024.cam.x264", "720p", 0, 0)));
        assert!(filter.excludes(&stream("Movie 2024 TS", "720p", 0, 0)));
        // "TS" inside a word is not a match
        assert!(!filter.excludes(&stream("Movie.2024.1080p.WEB.DTS", "1080p", 0, 0)));
        assert!(!filter.excludes(&stream("Cameraman.2024.1080p", "1080p", 0, 0)));
    }

    #[test]
    fn test_exclusion_matches_percent_encoded_url() {
        let filter = ExclusionFilter::from_filters(&filters("47BT")).unwrap();
        let mut s = stream("Torrentio RD+", "1080p", 0, 0);
        s.url = "https://example.com/resolve/%5B47BT%5D.Movie.mkv".to_string();
        assert!(filter.excludes(&s));
    }

    #[test]
    fn test_decode_url() {
        assert_eq!(decode_url("a%5BB%5D+c"), "a[B] c");
        assert_eq!(decode_url("plain"), "plain");
        // Invalid UTF-8 escape falls back to the raw string
        assert_eq!(decode_url("bad%FF"), "bad%FF");
    }

    #[test]
    fn test_sort_spec_parse() {
        let spec = SortSpec::parse("seeders, size ,bogus", "lowest");
        assert_eq!(spec.fields, vec![SortField::Seeders, SortField::Size]);
        assert_eq!(spec.prefer, SortPreference::Smallest);

        let spec = SortSpec::parse("", "whatever");
        assert_eq!(spec, SortSpec::default());
    }

    #[test]
    fn test_best_sort_prefers_quality_then_size_then_seeders() {
        let mut streams = vec![
            stream("a", "720p", 5, 100),
            stream("b", "1080p", 5, 10),
            stream("c", "1080p", 9, 1),
            stream("d", "1080p", 9, 50),
        ];
        SortSpec::default().sort(&mut streams);
        let names: Vec<_> = streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_smallest_sort_puts_unknown_size_last() {
        let spec = SortSpec::parse("size", "smallest");
        let mut streams = vec![
            stream("unknown", "1080p", 0, 0),
            stream("big", "1080p", 9_000, 0),
            stream("small", "1080p", 1_000, 0),
        ];
        spec.sort(&mut streams);
        let names: Vec<_> = streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["small", "big", "unknown"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut streams = vec![
            stream("first", "1080p", 1, 1),
            stream("second", "1080p", 1, 1),
        ];
        SortSpec::default().sort(&mut streams);
        assert_eq!(streams[0].name, "first");
    }
}
