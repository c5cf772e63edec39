//! FFprobe-based stream inspection.

use super::types::*;
use crate::command::ToolCommand;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default probe timeout: 1 minute.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    level: Option<serde_json::Value>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Runs `ffprobe` against a file and parses its JSON report.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a prober using the given ffprobe executable.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `path`, killing ffprobe if `cancel` fires first.
    pub async fn probe_cancellable(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<MediaStreamInfo> {
        match tokio::fs::metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::file_not_found(path));
            }
            Err(e) => return Err(e.into()),
        }

        let output = ToolCommand::new(self.program.clone())
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path.to_string_lossy())
            .timeout(self.timeout)
            .cancel_on(cancel)
            .execute()
            .await?;

        parse_ffprobe_json(path, &output.stdout)
    }
}

#[async_trait::async_trait]
impl super::MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaStreamInfo> {
        self.probe_cancellable(path, CancellationToken::new()).await
    }
}

/// Parse an ffprobe `-print_format json` report.
///
/// A missing `streams` array yields an empty stream list; anything that is not
/// a JSON object is a parse error.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaStreamInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::parse_error("ffprobe", e.to_string()))?;

    let format = output.format.map(|f| FormatInfo {
        format_name: f.format_name,
        duration: f
            .duration
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        size: f.size.and_then(|s| s.parse().ok()),
        bit_rate: f.bit_rate.and_then(|s| s.parse().ok()),
    });

    let mut streams = Vec::new();
    for raw in output.streams.unwrap_or_default() {
        let stream: FfprobeStream = serde_json::from_value(raw.clone())
            .map_err(|e| Error::parse_error("ffprobe", format!("stream entry: {e}")))?;

        streams.push(StreamDescriptor {
            index: stream.index,
            codec_type: CodecType::from(stream.codec_type.as_str()),
            codec_name: stream.codec_name,
            profile: stream.profile,
            level: stream.level.and_then(level_to_string),
            width: stream.width,
            height: stream.height,
            raw,
        });
    }

    Ok(MediaStreamInfo {
        file_path: path.to_path_buf(),
        format,
        streams,
    })
}

fn level_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}
