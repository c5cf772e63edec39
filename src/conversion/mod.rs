//! Transcode orchestration.
//!
//! Turns an input file into a progressively playable MP4:
//!
//! - [`TranscodeOptions`] and [`QualityPreset`] describe what the caller wants
//! - [`decide_plan`] picks the cheapest viable [`TranscodePlan`]
//! - [`Encoder`] runs one ffmpeg process per job under a supervisor task
//! - [`JobTable`] tracks running jobs for listing and cancellation
//! - [`TranscodeManager`] wires these together with the stream inspector
//!   and the output cache

mod executor;
mod jobs;
mod manager;
mod options;
mod plan;

pub use executor::{parse_out_time, ConversionError, Encoder, JobHandle, OutputTarget};
pub use jobs::{ActiveJob, JobId, JobStatus, JobTable};
pub use manager::{CachedTranscode, TranscodeManager};
pub use options::{QualityPreset, TranscodeOptions};
pub use plan::{
    decide_plan, encoder_args, fallback_plan, AudioAction, AudioEncodeParams, TranscodePlan,
    VideoAction, VideoEncodeParams,
};
