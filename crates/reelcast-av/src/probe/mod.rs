//! Stream inspection.
//!
//! Probing is delegated to `ffprobe`; a probe failure is returned to the
//! caller immediately, with no retries.

mod compat;
mod ffprobe;
mod types;

pub use compat::{classify_copyability, parse_level, CopyCapability, CopyPolicy, MAX_COPY_LEVEL};
pub use ffprobe::{parse_ffprobe_json, FfprobeProber, DEFAULT_PROBE_TIMEOUT};
pub use types::*;

use crate::Result;
use std::path::Path;

/// Something that can inspect a media file's streams.
#[async_trait::async_trait]
pub trait MediaProber: Send + Sync {
    /// Probe `path`, returning its stream metadata.
    async fn probe(&self, path: &Path) -> Result<MediaStreamInfo>;
}
