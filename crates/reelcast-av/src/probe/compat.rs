//! Stream-copy eligibility.
//!
//! Decides whether a file's primary video and audio streams can be written
//! into an MP4 container for browser playback without re-encoding.

use super::types::{MediaStreamInfo, StreamDescriptor};
use serde::{Deserialize, Serialize};

/// Highest H.264 level accepted for stream copy.
pub const MAX_COPY_LEVEL: f64 = 4.1;

const COPY_PROFILES: [&str; 3] = ["baseline", "main", "high"];

/// Caller-controlled relaxations of the copy rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyPolicy {
    /// Accept HEVC video for stream copy.
    #[serde(default)]
    pub allow_hevc_copy: bool,
}

/// Which primary streams can be copied as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyCapability {
    pub video_copyable: bool,
    pub audio_copyable: bool,
}

impl CopyCapability {
    /// Both streams copyable.
    pub fn all(&self) -> bool {
        self.video_copyable && self.audio_copyable
    }
}

/// Classify a probe result. Absent info yields nothing copyable.
pub fn classify_copyability(info: Option<&MediaStreamInfo>, policy: CopyPolicy) -> CopyCapability {
    let Some(info) = info else {
        return CopyCapability::default();
    };

    CopyCapability {
        video_copyable: info
            .primary_video()
            .is_some_and(|v| video_copyable(v, policy)),
        audio_copyable: info.primary_audio().is_some_and(audio_copyable),
    }
}

fn video_copyable(stream: &StreamDescriptor, policy: CopyPolicy) -> bool {
    let codec = stream
        .codec_name
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match codec.as_str() {
        "h264" | "avc" | "avc1" => {
            let profile_ok = stream
                .profile
                .as_deref()
                .map(|p| p.trim().to_ascii_lowercase())
                .is_some_and(|p| COPY_PROFILES.contains(&p.as_str()));
            let level = stream.level.as_deref().map(parse_level).unwrap_or(0.0);

            profile_ok && level > 0.0 && level <= MAX_COPY_LEVEL
        }
        "hevc" | "h265" => policy.allow_hevc_copy,
        _ => false,
    }
}

fn audio_copyable(stream: &StreamDescriptor) -> bool {
    matches!(
        stream
            .codec_name
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "aac" | "mp3"
    )
}

/// Parse a codec level, best effort.
///
/// Dotted values ("4.1") are taken as written. Bare integers are ffprobe's
/// `level_idc` form, ten times the level, so "41" is 4.1 and level 1b
/// ("9") is 0.9. Anything unparseable is 0.
pub fn parse_level(raw: &str) -> f64 {
    let raw = raw.trim();
    let level = match raw.parse::<f64>() {
        Ok(level) if level.is_finite() => level,
        _ => return 0.0,
    };
    if raw.contains('.') {
        level
    } else {
        level / 10.0
    }
}
