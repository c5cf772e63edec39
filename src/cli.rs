use clap::{Args, Parser, Subcommand};
use reelcast::conversion::{QualityPreset, TranscodeOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelcast")]
#[command(author, version, about = "Byte-range video server with on-demand MP4 transcoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a media file and display stream information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the processing plan chosen for a file
    Plan {
        /// File to plan for
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode a file to MP4 and wait for it to finish
    Transcode {
        /// Input file
        #[arg(required = true)]
        file: PathBuf,

        /// Output file (defaults to the cache slot for the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Copy all streams without probing (requires --output)
        #[arg(
            long,
            requires = "output",
            conflicts_with_all = ["force_encode", "max_width", "crf", "encoder_preset"]
        )]
        remux: bool,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Delete cache entries older than the given age
    CacheCleanup {
        /// Maximum age in hours (defaults to config)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Plan-shaping flags shared by `plan` and `transcode`.
#[derive(Args, Debug, Clone)]
pub struct EncodeArgs {
    /// Quality preset: quick-stream, high-quality or balanced
    #[arg(long, default_value = "balanced")]
    pub preset: QualityPreset,

    /// Re-encode even when streams could be copied
    #[arg(long)]
    pub force_encode: bool,

    /// Scale video down to at most this width
    #[arg(long)]
    pub max_width: Option<u32>,

    /// x264 constant rate factor
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: Option<u8>,

    /// x264 preset name (e.g. veryfast, slow)
    #[arg(long = "x264-preset")]
    pub encoder_preset: Option<String>,

    /// AAC bitrate in kbps
    #[arg(long)]
    pub audio_bitrate: Option<u32>,

    /// Allow HEVC video to be stream-copied
    #[arg(long)]
    pub allow_hevc_copy: bool,
}

impl EncodeArgs {
    /// Preset options with the explicit flags layered on top.
    pub fn options(&self) -> TranscodeOptions {
        self.preset.options().overlay(&TranscodeOptions {
            force_encode: self.force_encode,
            max_width: self.max_width,
            preset: self.encoder_preset.clone(),
            crf: self.crf,
            audio_bitrate: self.audio_bitrate,
            allow_hevc_copy: self.allow_hevc_copy.then_some(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_preset() {
        let cli = Cli::parse_from([
            "reelcast",
            "plan",
            "in.mkv",
            "--preset",
            "quick-stream",
            "--crf",
            "30",
        ]);
        let Commands::Plan { encode, .. } = cli.command else {
            panic!("expected plan command");
        };
        let options = encode.options();
        assert_eq!(options.crf, Some(30));
        assert_eq!(options.max_width, Some(1920));
        assert_eq!(options.preset.as_deref(), Some("ultrafast"));
        assert_eq!(options.allow_hevc_copy, None);
    }

    #[test]
    fn test_remux_conflicts_with_encode_flags() {
        let args = [
            "reelcast", "transcode", "in.mkv", "-o", "out.mp4", "--remux", "--force-encode",
        ];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_remux_requires_output() {
        let args = ["reelcast", "transcode", "in.mkv", "--remux"];
        assert!(Cli::try_parse_from(args).is_err());

        let args = ["reelcast", "transcode", "in.mkv", "--remux", "-o", "out.mp4"];
        assert!(Cli::try_parse_from(args).is_ok());
    }
}
