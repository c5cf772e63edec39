//! Stream metadata types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Other,
}

impl From<&str> for CodecType {
    fn from(s: &str) -> Self {
        match s {
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Other,
        }
    }
}

/// One stream as reported by the prober.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream index within the container.
    pub index: u32,
    pub codec_type: CodecType,
    /// Codec short name (e.g. "h264", "hevc", "aac").
    pub codec_name: Option<String>,
    /// Codec profile (e.g. "High", "Main").
    pub profile: Option<String>,
    /// Codec level as reported; ffprobe uses integers like `41` for H.264 4.1.
    pub level: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Unmodified stream object from the prober.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Container-level information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Container format (e.g. "matroska,webm", "mov,mp4,m4a,3gp,3g2,mj2").
    pub format_name: String,
    pub duration: Option<Duration>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Overall bit rate in bits per second.
    pub bit_rate: Option<u64>,
}

/// Result of probing a media file. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStreamInfo {
    pub file_path: PathBuf,
    pub format: Option<FormatInfo>,
    /// Streams in container order.
    pub streams: Vec<StreamDescriptor>,
}

impl MediaStreamInfo {
    /// The first video stream.
    pub fn primary_video(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| s.codec_type == CodecType::Video)
    }

    /// The first audio stream.
    pub fn primary_audio(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| s.codec_type == CodecType::Audio)
    }

    /// Container duration, if known.
    pub fn duration(&self) -> Option<Duration> {
        self.format.as_ref().and_then(|f| f.duration)
    }
}
