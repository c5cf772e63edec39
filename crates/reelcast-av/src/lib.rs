//! # reelcast-av
//!
//! External media tooling for reelcast:
//! - Probing files with `ffprobe` into [`MediaStreamInfo`]
//! - Deciding which streams can be copied into MP4 without re-encoding
//! - Running tools with bounded diagnostic capture, timeouts and cancellation
//!
//! ## Example
//!
//! ```no_run
//! use reelcast_av::{classify_copyability, CopyPolicy, FfprobeProber, MediaProber};
//! use std::path::{Path, PathBuf};
//!
//! # async fn example() -> reelcast_av::Result<()> {
//! let prober = FfprobeProber::new(PathBuf::from("ffprobe"));
//! let info = prober.probe(Path::new("/path/to/video.mkv")).await?;
//! let caps = classify_copyability(Some(&info), CopyPolicy::default());
//! println!("video copy: {}, audio copy: {}", caps.video_copyable, caps.audio_copyable);
//! # Ok(())
//! # }
//! ```

pub mod command;
mod error;
pub mod probe;
pub mod tools;

pub use command::{DiagnosticBuffer, ToolCommand, ToolOutput, DEFAULT_DIAGNOSTIC_LIMIT};
pub use error::{Error, Result};
pub use probe::{
    classify_copyability, CodecType, CopyCapability, CopyPolicy, FfprobeProber, FormatInfo,
    MediaProber, MediaStreamInfo, StreamDescriptor,
};
pub use tools::{check_tool, check_tools, require_tool, resolve_tool, ToolInfo};
