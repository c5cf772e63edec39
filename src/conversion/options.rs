//! Per-call transcode options and named quality presets.

use crate::config::ConversionConfig;
use reelcast_av::CopyPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Caller overrides for a single transcode. Unset fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeOptions {
    /// Re-encode both streams even when they could be copied.
    #[serde(default)]
    pub force_encode: bool,

    /// Scale video down to at most this width, keeping aspect ratio.
    #[serde(default)]
    pub max_width: Option<u32>,

    /// x264 preset name.
    #[serde(default)]
    pub preset: Option<String>,

    /// x264 constant rate factor.
    #[serde(default)]
    pub crf: Option<u8>,

    /// AAC bitrate in kbps.
    #[serde(default)]
    pub audio_bitrate: Option<u32>,

    /// Accept HEVC video for stream copy.
    #[serde(default)]
    pub allow_hevc_copy: Option<bool>,
}

impl TranscodeOptions {
    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn overlay(self, overrides: &TranscodeOptions) -> TranscodeOptions {
        TranscodeOptions {
            force_encode: self.force_encode || overrides.force_encode,
            max_width: overrides.max_width.or(self.max_width),
            preset: overrides.preset.clone().or(self.preset),
            crf: overrides.crf.or(self.crf),
            audio_bitrate: overrides.audio_bitrate.or(self.audio_bitrate),
            allow_hevc_copy: overrides.allow_hevc_copy.or(self.allow_hevc_copy),
        }
    }

    pub fn copy_policy(&self, defaults: &ConversionConfig) -> CopyPolicy {
        CopyPolicy {
            allow_hevc_copy: self.allow_hevc_copy.unwrap_or(defaults.allow_hevc_copy),
        }
    }

    pub fn resolved_preset(&self, defaults: &ConversionConfig) -> String {
        self.preset
            .clone()
            .unwrap_or_else(|| defaults.video_preset.clone())
    }

    pub fn resolved_crf(&self, defaults: &ConversionConfig) -> u8 {
        self.crf.unwrap_or(defaults.video_crf)
    }

    pub fn resolved_audio_bitrate(&self, defaults: &ConversionConfig) -> u32 {
        self.audio_bitrate.unwrap_or(defaults.audio_bitrate_kbps)
    }
}

/// Named option bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPreset {
    /// Fast 1080p-bounded encode for immediate playback.
    QuickStream,
    /// Slow, low-CRF encode.
    HighQuality,
    /// Default used by the cached entry point; no forced scaling.
    #[default]
    Balanced,
}

impl QualityPreset {
    pub fn options(self) -> TranscodeOptions {
        match self {
            Self::QuickStream => TranscodeOptions {
                max_width: Some(1920),
                crf: Some(28),
                preset: Some("ultrafast".to_string()),
                ..Default::default()
            },
            Self::HighQuality => TranscodeOptions {
                crf: Some(20),
                preset: Some("slow".to_string()),
                ..Default::default()
            },
            Self::Balanced => TranscodeOptions {
                preset: Some("fast".to_string()),
                ..Default::default()
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::QuickStream => "quick-stream",
            Self::HighQuality => "high-quality",
            Self::Balanced => "balanced",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick-stream" | "quick" => Ok(Self::QuickStream),
            "high-quality" | "hq" => Ok(Self::HighQuality),
            "balanced" | "smart" | "auto" => Ok(Self::Balanced),
            _ => Err(format!("Unknown quality preset: {}", s)),
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
