//! Release title parsing.
//!
//! Every attribute is resolved from an ordered marker table evaluated against the
//! upper-cased title. The first entry whose marker appears wins, so more specific
//! or more valuable formats sit ahead of generic ones ("TRUEHD.ATMOS" is Atmos,
//! "HDR10+.DV" is Dolby Vision).

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::types::{AudioFormat, Codec, HdrType, ParsedQuality, Resolution, SourceType};

/// Ordered (marker, value) table.
type MarkerTable<T> = &'static [(&'static str, T)];

pub(crate) const RESOLUTION_MARKERS: MarkerTable<Resolution> = &[
    ("2160P", Resolution::P2160),
    ("4K", Resolution::P2160),
    ("UHD", Resolution::P2160),
    ("1080P", Resolution::P1080),
    ("720P", Resolution::P720),
    ("576P", Resolution::P576),
    ("480P", Resolution::P480),
];

pub(crate) const HDR_MARKERS: MarkerTable<HdrType> = &[
    ("DV", HdrType::DolbyVision),
    ("DOLBY.VISION", HdrType::DolbyVision),
    ("DOLBYVISION", HdrType::DolbyVision),
    ("HDR10+", HdrType::Hdr10Plus),
    ("HDR10PLUS", HdrType::Hdr10Plus),
    ("HDR10", HdrType::Hdr10),
    ("HDR", HdrType::Hdr),
];

pub(crate) const AUDIO_MARKERS: MarkerTable<AudioFormat> = &[
    ("ATMOS", AudioFormat::Atmos),
    ("TRUEHD", AudioFormat::TrueHd),
    ("DTS-HD.MA", AudioFormat::DtsHdMa),
    ("DTS-HD MA", AudioFormat::DtsHdMa),
    ("DTS-HD", AudioFormat::DtsHd),
    ("DTS-X", AudioFormat::DtsX),
    ("DTSX", AudioFormat::DtsX),
    ("DD+", AudioFormat::DdPlus),
    ("EAC3", AudioFormat::DdPlus),
    ("E-AC3", AudioFormat::DdPlus),
    ("AC3", AudioFormat::Ac3),
    ("DD", AudioFormat::Ac3),
    ("DTS", AudioFormat::Dts),
    ("AAC", AudioFormat::Aac),
    ("MP3", AudioFormat::Mp3),
];

pub(crate) const SOURCE_MARKERS: MarkerTable<SourceType> = &[
    ("REMUX", SourceType::Remux),
    ("BLURAY", SourceType::BluRay),
    ("BLU-RAY", SourceType::BluRay),
    ("BDRIP", SourceType::BluRay),
    ("WEB-DL", SourceType::WebDl),
    ("WEBDL", SourceType::WebDl),
    ("WEBRIP", SourceType::WebRip),
    ("WEB", SourceType::WebRip),
    ("HDTV", SourceType::Hdtv),
    ("DVDRIP", SourceType::DvdRip),
    ("CAM", SourceType::Cam),
    ("HDCAM", SourceType::Cam),
    ("TS", SourceType::Telesync),
    ("TELESYNC", SourceType::Telesync),
    ("TC", SourceType::Telecine),
    ("TELECINE", SourceType::Telecine),
];

pub(crate) const CODEC_MARKERS: MarkerTable<Codec> = &[
    ("H.265", Codec::Hevc),
    ("H265", Codec::Hevc),
    ("HEVC", Codec::Hevc),
    ("H.264", Codec::Avc),
    ("H264", Codec::Avc),
    ("AVC", Codec::Avc),
    ("AV1", Codec::Av1),
    ("VP9", Codec::Vp9),
    ("XVID", Codec::Xvid),
];

static SIZE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s?(GB|TB|MB)").expect("valid size regex"));

fn first_match<T: Copy>(upper: &str, table: MarkerTable<T>, fallback: T) -> T {
    table
        .iter()
        .find(|(marker, _)| upper.contains(marker))
        .map(|(_, value)| *value)
        .unwrap_or(fallback)
}

/// Parse quality attributes from a release title.
///
/// Never fails: missing signals resolve to `SD`, `SDR` or the `Unknown` variants.
/// Size is extracted from the title; seeders start at 0 (see [`ParsedQuality::with_seeders`]).
pub fn parse_quality(title: &str) -> ParsedQuality {
    let upper = title.to_uppercase();

    ParsedQuality {
        resolution: first_match(&upper, RESOLUTION_MARKERS, Resolution::Sd),
        hdr_type: first_match(&upper, HDR_MARKERS, HdrType::Sdr),
        audio_format: first_match(&upper, AUDIO_MARKERS, AudioFormat::Unknown),
        source: first_match(&upper, SOURCE_MARKERS, SourceType::Unknown),
        codec: first_match(&upper, CODEC_MARKERS, Codec::Unknown),
        size_gb: extract_size_gb(title),
        seeders: 0,
    }
}

/// Extract a `<number><unit>` size token from a title, normalised to GB.
///
/// TB is multiplied by 1024, MB divided by 1024. Returns 0 when no token is present.
pub fn extract_size_gb(title: &str) -> f64 {
    let upper = title.to_uppercase();
    let Some(caps) = SIZE_REGEX.captures(&upper) else {
        return 0.0;
    };

    let size: f64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);

    match caps.get(2).map(|m| m.as_str()) {
        Some("TB") => size * 1024.0,
        Some("MB") => size / 1024.0,
        Some("GB") => size,
        _ => 0.0,
    }
}
