//! Deterministic quality scoring.
//!
//! Resolution (40) + HDR (15) + audio (15) + source (20) + log10(seeders) * 2,
//! minus a resolution-relative size penalty. Totals are floored at zero, so the
//! practical maximum sits around 100.

use super::types::{AudioFormat, HdrType, ParsedQuality, QualityScore, Resolution, SourceType};

/// Compute the score breakdown for a parsed quality.
pub fn score_quality(quality: &ParsedQuality) -> QualityScore {
    let resolution_score = resolution_score(quality.resolution);
    let hdr_score = hdr_score(quality.hdr_type);
    let audio_score = audio_score(quality.audio_format);
    let source_score = source_score(quality.source);
    let seeders_score = seeders_score(quality.seeders);
    let size_penalty = size_penalty(quality.size_gb, quality.resolution);

    let total_score =
        (resolution_score + hdr_score + audio_score + source_score + seeders_score - size_penalty)
            .max(0);

    QualityScore {
        resolution_score,
        hdr_score,
        audio_score,
        source_score,
        seeders_score,
        size_penalty,
        total_score,
    }
}

pub fn resolution_score(resolution: Resolution) -> i32 {
    match resolution {
        Resolution::P2160 => 40,
        Resolution::P1080 => 30,
        Resolution::P720 => 15,
        Resolution::P576 | Resolution::P480 | Resolution::Sd => 5,
    }
}

pub fn hdr_score(hdr: HdrType) -> i32 {
    match hdr {
        HdrType::DolbyVision => 15,
        HdrType::Hdr10Plus => 12,
        HdrType::Hdr10 => 10,
        HdrType::Hdr | HdrType::Sdr => 0,
    }
}

pub fn audio_score(audio: AudioFormat) -> i32 {
    match audio {
        AudioFormat::Atmos => 15,
        AudioFormat::TrueHd | AudioFormat::DtsHdMa => 12,
        AudioFormat::DtsHd | AudioFormat::DtsX => 10,
        AudioFormat::DdPlus => 7,
        AudioFormat::Ac3 | AudioFormat::Dts => 5,
        AudioFormat::Aac | AudioFormat::Mp3 => 2,
        AudioFormat::Unknown => 0,
    }
}

pub fn source_score(source: SourceType) -> i32 {
    match source {
        SourceType::Remux => 20,
        SourceType::BluRay => 15,
        SourceType::WebDl => 12,
        SourceType::WebRip => 8,
        SourceType::Hdtv | SourceType::DvdRip => 5,
        SourceType::Cam | SourceType::Telesync | SourceType::Telecine => 1,
        SourceType::Unknown => 0,
    }
}

/// `floor(log10(seeders) * 2)`: 10 → 2, 100 → 4, 1000 → 6.
pub fn seeders_score(seeders: u32) -> i32 {
    if seeders == 0 {
        return 0;
    }
    ((seeders as f64).log10() * 2.0).floor() as i32
}

/// Penalty for bloated files. Unknown size (0) is never penalised.
pub fn size_penalty(size_gb: f64, resolution: Resolution) -> i32 {
    if size_gb <= 0.0 {
        return 0;
    }

    let (hard, soft) = match resolution {
        Resolution::P2160 => (100.0, 80.0),
        Resolution::P1080 => (60.0, 40.0),
        Resolution::P720 => (30.0, 20.0),
        _ => return 0,
    };

    if size_gb > hard {
        10
    } else if size_gb > soft {
        5
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{parse_quality, Codec};

    fn best_quality() -> ParsedQuality {
        ParsedQuality {
            resolution: Resolution::P2160,
            hdr_type: HdrType::DolbyVision,
            audio_format: AudioFormat::Atmos,
            source: SourceType::Remux,
            codec: Codec::Hevc,
            size_gb: 0.0,
            seeders: 0,
        }
    }

    #[test]
    fn test_best_attributes_score_ninety() {
        let score = score_quality(&best_quality());
        assert_eq!(score.resolution_score, 40);
        assert_eq!(score.hdr_score, 15);
        assert_eq!(score.audio_score, 15);
        assert_eq!(score.source_score, 20);
        assert_eq!(score.total_score, 90);
    }

    #[test]
    fn test_best_attributes_with_seeders_near_hundred() {
        let score = score_quality(&best_quality().with_seeders(100_000));
        assert_eq!(score.seeders_score, 10);
        assert_eq!(score.total_score, 100);
    }

    #[test]
    fn test_seeders_log_scale() {
        assert_eq!(seeders_score(0), 0);
        assert_eq!(seeders_score(1), 0);
        assert_eq!(seeders_score(9), 1);
        assert_eq!(seeders_score(10), 2);
        assert_eq!(seeders_score(100), 4);
        assert_eq!(seeders_score(1000), 6);
    }

    #[test]
    fn test_size_penalty_thresholds() {
        assert_eq!(size_penalty(0.0, Resolution::P2160), 0);
        assert_eq!(size_penalty(80.0, Resolution::P2160), 0);
        assert_eq!(size_penalty(85.0, Resolution::P2160), 5);
        assert_eq!(size_penalty(120.0, Resolution::P2160), 10);
        assert_eq!(size_penalty(45.0, Resolution::P1080), 5);
        assert_eq!(size_penalty(61.0, Resolution::P1080), 10);
        assert_eq!(size_penalty(25.0, Resolution::P720), 5);
        assert_eq!(size_penalty(31.0, Resolution::P720), 10);
        assert_eq!(size_penalty(500.0, Resolution::P480), 0);
    }

    #[test]
    fn test_total_never_negative() {
        let quality = ParsedQuality::default().with_size_gb(500.0);
        let score = score_quality(&quality);
        assert!(score.total_score >= 0);
        assert_eq!(score.total_score, 5);

        let quality = ParsedQuality {
            resolution: Resolution::P720,
            size_gb: 40.0,
            ..ParsedQuality::default()
        };
        let score = score_quality(&quality);
        assert_eq!(score.size_penalty, 10);
        assert_eq!(score.total_score, 5);
    }

    #[test]
    fn test_score_from_title() {
        let quality = parse_quality("Movie.2024.1080p.BluRay.DTS-HD.MA.5.1.x264").with_seeders(100);
        let score = score_quality(&quality);
        // 30 + 0 + 12 + 15 + 4
        assert_eq!(score.total_score, 61);
    }

    #[test]
    fn test_all_combinations_bounded() {
        use crate::quality::parser::{AUDIO_MARKERS, HDR_MARKERS, RESOLUTION_MARKERS, SOURCE_MARKERS};

        for (_, resolution) in RESOLUTION_MARKERS {
            for (_, hdr_type) in HDR_MARKERS {
                for (_, audio_format) in AUDIO_MARKERS {
                    for (_, source) in SOURCE_MARKERS {
                        let quality = ParsedQuality {
                            resolution: *resolution,
                            hdr_type: *hdr_type,
                            audio_format: *audio_format,
                            source: *source,
                            codec: Codec::Unknown,
                            size_gb: 150.0,
                            seeders: 50,
                        };
                        let total = score_quality(&quality).total_score;
                        assert!((0..=100).contains(&total));
                    }
                }
            }
        }
    }
}
