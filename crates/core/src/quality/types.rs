//! Types describing the quality attributes of a release.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Video resolution bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    Sd,
    P480,
    P576,
    P720,
    P1080,
    P2160,
}

/// HDR technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HdrType {
    DolbyVision,
    Hdr10Plus,
    Hdr10,
    Hdr,
    Sdr,
}

/// Audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudioFormat {
    Atmos,
    TrueHd,
    DtsHdMa,
    DtsHd,
    DtsX,
    DdPlus,
    Ac3,
    Dts,
    Aac,
    Mp3,
    Unknown,
}

/// Release source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceType {
    Remux,
    BluRay,
    WebDl,
    WebRip,
    Hdtv,
    DvdRip,
    Cam,
    Telesync,
    Telecine,
    Unknown,
}

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Codec {
    Hevc,
    Avc,
    Av1,
    Vp9,
    Xvid,
    Unknown,
}

/// Error returned when a stored label does not name a known value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind} label: {label}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

macro_rules! labelled {
    ($ty:ident, $kind:literal, [$($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)?]) => {
        impl $ty {
            /// Canonical display label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = UnknownLabel;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl FromStr for $ty {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label $(| $alias)* => Ok($ty::$variant),)+
                    other => Err(UnknownLabel {
                        kind: $kind,
                        label: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled!(Resolution, "resolution", [
    Sd => "SD",
    P480 => "480p",
    P576 => "576p",
    P720 => "720p" | "HD",
    P1080 => "1080p" | "FHD",
    P2160 => "2160p" | "4K" | "UHD",
]);

labelled!(HdrType, "hdr", [
    DolbyVision => "DV" | "Dolby Vision",
    Hdr10Plus => "HDR10+" | "HDR10PLUS",
    Hdr10 => "HDR10",
    Hdr => "HDR",
    Sdr => "SDR" | "",
]);

labelled!(AudioFormat, "audio", [
    Atmos => "Atmos" | "TrueHD Atmos" | "TrueHD.Atmos",
    TrueHd => "TrueHD",
    DtsHdMa => "DTS-HD MA" | "DTS-HD.MA",
    DtsHd => "DTS-HD",
    DtsX => "DTS-X",
    DdPlus => "DD+" | "EAC3" | "E-AC3",
    Ac3 => "AC3" | "DD",
    Dts => "DTS",
    Aac => "AAC",
    Mp3 => "MP3",
    Unknown => "",
]);

labelled!(SourceType, "source", [
    Remux => "REMUX" | "Remux",
    BluRay => "BluRay" | "Blu-ray" | "BDRip",
    WebDl => "WEB-DL" | "WEBDL",
    WebRip => "WEBRip" | "WEB",
    Hdtv => "HDTV",
    DvdRip => "DVDRip",
    Cam => "CAM" | "HDCAM",
    Telesync => "TS",
    Telecine => "TC",
    Unknown => "",
]);

labelled!(Codec, "codec", [
    Hevc => "HEVC",
    Avc => "AVC",
    Av1 => "AV1",
    Vp9 => "VP9",
    Xvid => "XviD",
    Unknown => "",
]);

/// Quality attributes parsed from a release title.
///
/// Pure projection of the title: the same title always yields the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuality {
    pub resolution: Resolution,
    pub hdr_type: HdrType,
    pub audio_format: AudioFormat,
    pub source: SourceType,
    pub codec: Codec,
    /// Size in GB, 0 when unknown.
    pub size_gb: f64,
    pub seeders: u32,
}

impl ParsedQuality {
    /// Set the seeder count used for scoring.
    pub fn with_seeders(mut self, seeders: u32) -> Self {
        self.seeders = seeders;
        self
    }

    /// Set the size used for the bloat penalty.
    pub fn with_size_gb(mut self, size_gb: f64) -> Self {
        self.size_gb = size_gb;
        self
    }
}

impl Default for ParsedQuality {
    fn default() -> Self {
        Self {
            resolution: Resolution::Sd,
            hdr_type: HdrType::Sdr,
            audio_format: AudioFormat::Unknown,
            source: SourceType::Unknown,
            codec: Codec::Unknown,
            size_gb: 0.0,
            seeders: 0,
        }
    }
}

/// Score breakdown for a parsed quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityScore {
    pub resolution_score: i32,
    pub hdr_score: i32,
    pub audio_score: i32,
    pub source_score: i32,
    pub seeders_score: i32,
    pub size_penalty: i32,
    /// Sum of the positive parts minus the penalty, never below zero.
    pub total_score: i32,
}
