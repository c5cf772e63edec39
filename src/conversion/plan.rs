//! Processing plan selection and encoder argument construction.
//!
//! The cheapest viable path wins: remux when both primary streams can be
//! copied, copy whichever stream can be kept otherwise, and only fall back
//! to a full re-encode when nothing can be reused.

use super::options::TranscodeOptions;
use crate::config::ConversionConfig;
use reelcast_av::CopyCapability;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// H.264 encode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEncodeParams {
    pub encoder: String,
    pub preset: String,
    pub crf: u8,
    pub profile: String,
    pub level: String,
    pub pixel_format: String,
    /// Upper bound on output width; height follows the aspect ratio.
    pub max_width: Option<u32>,
}

impl VideoEncodeParams {
    pub fn from_options(options: &TranscodeOptions, defaults: &ConversionConfig) -> Self {
        Self {
            encoder: "libx264".to_string(),
            preset: options.resolved_preset(defaults),
            crf: options.resolved_crf(defaults),
            profile: "high".to_string(),
            level: "4.1".to_string(),
            pixel_format: "yuv420p".to_string(),
            max_width: options.max_width,
        }
    }

    /// `-vf` expression bounding the width, with an even computed height.
    pub fn scale_filter(&self) -> Option<String> {
        self.max_width
            .map(|width| format!("scale='min({},iw)':-2", width))
    }
}

/// AAC encode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEncodeParams {
    pub encoder: String,
    pub bitrate_kbps: u32,
}

impl AudioEncodeParams {
    pub fn from_options(options: &TranscodeOptions, defaults: &ConversionConfig) -> Self {
        Self {
            encoder: "aac".to_string(),
            bitrate_kbps: options.resolved_audio_bitrate(defaults),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VideoAction {
    Copy,
    Encode(VideoEncodeParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AudioAction {
    Copy,
    Encode(AudioEncodeParams),
}

/// How a file will be processed. Derived once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscodePlan {
    /// Copy every stream; only the container changes.
    FastRemux,
    /// Per-stream copy or encode.
    SelectiveCopy {
        video: VideoAction,
        audio: AudioAction,
    },
    /// Re-encode both streams.
    FullTranscode {
        video: VideoEncodeParams,
        audio: AudioEncodeParams,
    },
}

impl TranscodePlan {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FastRemux => "fast_remux",
            Self::SelectiveCopy { .. } => "selective_copy",
            Self::FullTranscode { .. } => "full_transcode",
        }
    }
}

/// Choose a plan from the copy capability of the input.
pub fn decide_plan(
    caps: CopyCapability,
    options: &TranscodeOptions,
    defaults: &ConversionConfig,
) -> TranscodePlan {
    let forced = options.force_encode;
    let scaling = options.max_width.is_some();

    if caps.all() && !forced && !scaling {
        return TranscodePlan::FastRemux;
    }

    let video = if caps.video_copyable && !forced && !scaling {
        VideoAction::Copy
    } else {
        VideoAction::Encode(VideoEncodeParams::from_options(options, defaults))
    };

    let audio = if caps.audio_copyable && !forced {
        AudioAction::Copy
    } else {
        AudioAction::Encode(AudioEncodeParams::from_options(options, defaults))
    };

    match (video, audio) {
        (VideoAction::Encode(video), AudioAction::Encode(audio)) => {
            TranscodePlan::FullTranscode { video, audio }
        }
        (video, audio) => TranscodePlan::SelectiveCopy { video, audio },
    }
}

/// Plan used when the input could not be inspected.
pub fn fallback_plan(options: &TranscodeOptions, defaults: &ConversionConfig) -> TranscodePlan {
    TranscodePlan::FullTranscode {
        video: VideoEncodeParams::from_options(options, defaults),
        audio: AudioEncodeParams::from_options(options, defaults),
    }
}

/// Full ffmpeg argument list for a plan.
///
/// Progress is reported as `key=value` lines on stdout; stderr carries only
/// diagnostics.
pub fn encoder_args(plan: &TranscodePlan, input: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-nostats",
        "-progress",
        "pipe:1",
        "-i",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(input.to_string_lossy().to_string());

    match plan {
        TranscodePlan::FastRemux => {
            args.extend(["-c".to_string(), "copy".to_string()]);
        }
        TranscodePlan::SelectiveCopy { video, audio } => {
            push_video(&mut args, video);
            push_audio(&mut args, audio);
        }
        TranscodePlan::FullTranscode { video, audio } => {
            push_video_encode(&mut args, video);
            push_audio_encode(&mut args, audio);
        }
    }

    // MP4 with the index up front for progressive playback
    args.extend(["-f", "mp4", "-movflags", "+faststart", "-y"].map(String::from));
    args.push(output.to_string_lossy().to_string());

    args
}

fn push_video(args: &mut Vec<String>, action: &VideoAction) {
    match action {
        VideoAction::Copy => args.extend(["-c:v".to_string(), "copy".to_string()]),
        VideoAction::Encode(params) => push_video_encode(args, params),
    }
}

fn push_audio(args: &mut Vec<String>, action: &AudioAction) {
    match action {
        AudioAction::Copy => args.extend(["-c:a".to_string(), "copy".to_string()]),
        AudioAction::Encode(params) => push_audio_encode(args, params),
    }
}

fn push_video_encode(args: &mut Vec<String>, params: &VideoEncodeParams) {
    args.extend([
        "-c:v".to_string(),
        params.encoder.clone(),
        "-preset".to_string(),
        params.preset.clone(),
        "-crf".to_string(),
        params.crf.to_string(),
        "-profile:v".to_string(),
        params.profile.clone(),
        "-level:v".to_string(),
        params.level.clone(),
        "-pix_fmt".to_string(),
        params.pixel_format.clone(),
    ]);

    if let Some(filter) = params.scale_filter() {
        args.extend(["-vf".to_string(), filter]);
    }
}

fn push_audio_encode(args: &mut Vec<String>, params: &AudioEncodeParams) {
    args.extend([
        "-c:a".to_string(),
        params.encoder.clone(),
        "-b:a".to_string(),
        format!("{}k", params.bitrate_kbps),
    ]);
}
