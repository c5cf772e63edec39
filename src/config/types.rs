use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Directory served under `/media`. Never written to.
    #[serde(default = "default_media_root")]
    pub root: PathBuf,
}

fn default_media_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory holding transcoded outputs (created if absent).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Entries older than this are removed by cleanup (default: 24)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Interval of the background cleanup task; 0 disables it (default: 60)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_minutes: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/reelcast/cache")
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_age_hours: default_max_age_hours(),
            cleanup_interval_minutes: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// x264 preset used when a call does not choose one (default: "fast")
    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    /// Video CRF (lower = higher quality, default: 23)
    #[serde(default = "default_video_crf")]
    pub video_crf: u8,

    /// AAC bitrate in kbps (default: 128)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,

    /// Accept HEVC video for stream copy (default: false)
    #[serde(default)]
    pub allow_hevc_copy: bool,
}

fn default_video_preset() -> String {
    "fast".to_string()
}

fn default_video_crf() -> u8 {
    23
}

fn default_audio_bitrate() -> u32 {
    128
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            video_preset: default_video_preset(),
            video_crf: default_video_crf(),
            audio_bitrate_kbps: default_audio_bitrate(),
            allow_hevc_copy: false,
        }
    }
}

/// One row of the read-chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkTier {
    /// Applies to files strictly larger than this many bytes.
    pub above_bytes: u64,
    pub chunk_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Chunk size for files below every tier (default: 1 MiB)
    #[serde(default = "default_base_chunk")]
    pub base_chunk_bytes: u64,

    /// Size tiers, largest threshold first
    #[serde(default = "default_chunk_tiers")]
    pub tiers: Vec<ChunkTier>,
}

fn default_base_chunk() -> u64 {
    MIB
}

fn default_chunk_tiers() -> Vec<ChunkTier> {
    vec![
        ChunkTier {
            above_bytes: 5 * GIB,
            chunk_bytes: 5 * MIB,
        },
        ChunkTier {
            above_bytes: 2 * GIB,
            chunk_bytes: 3 * MIB,
        },
        ChunkTier {
            above_bytes: 500 * MIB,
            chunk_bytes: 2 * MIB,
        },
    ]
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            base_chunk_bytes: default_base_chunk(),
            tiers: default_chunk_tiers(),
        }
    }
}

impl StreamingConfig {
    /// Chunk size for a file of `file_size` bytes.
    pub fn chunk_size(&self, file_size: u64) -> u64 {
        self.tiers
            .iter()
            .find(|tier| file_size > tier.above_bytes)
            .map(|tier| tier.chunk_bytes)
            .unwrap_or(self.base_chunk_bytes)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Seconds before a hanging ffprobe is killed (default: 60)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// KiB of encoder stderr kept for failure reports (default: 64)
    #[serde(default = "default_diagnostic_limit_kib")]
    pub diagnostic_limit_kib: usize,
}

fn default_probe_timeout() -> u64 {
    60
}

fn default_diagnostic_limit_kib() -> usize {
    64
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: default_probe_timeout(),
            diagnostic_limit_kib: default_diagnostic_limit_kib(),
        }
    }
}
