mod cli;

use reelcast::{
    cache::{hours, TranscodeCache},
    config::{self, Config},
    conversion::{CachedTranscode, JobHandle, TranscodeManager},
    server,
};
use reelcast_av::{classify_copyability, resolve_tool, CopyPolicy, FfprobeProber, MediaProber};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, EncodeArgs};
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelcast=trace,reelcast_av=trace,tower_http=debug".to_string()
        } else {
            "reelcast=debug,reelcast_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, config_path))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, config_path))
        }
        Commands::Plan { file, encode, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(plan_file(&file, &encode, json, config_path))
        }
        Commands::Transcode {
            file,
            output,
            remux,
            encode,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode_file(
                &file,
                output.as_deref(),
                remux,
                &encode,
                config_path,
            ))
        }
        Commands::CacheCleanup { max_age_hours } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cleanup_cache(max_age_hours, config_path))
        }
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting reelcast server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn ensure_file(file: &Path) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    Ok(())
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    ensure_file(file)?;
    let config = config::load_config_or_default(config_path)?;

    let prober = FfprobeProber::new(resolve_tool("ffprobe", config.tools.ffprobe_path.as_deref()))
        .with_timeout(Duration::from_secs(config.tools.probe_timeout_secs));
    let info = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", info.file_path.display());
    if let Some(ref format) = info.format {
        println!("Container: {}", format.format_name);
        if let Some(size) = format.size {
            println!("Size: {} bytes", size);
        }
    }
    if let Some(duration) = info.duration() {
        let secs = duration.as_secs();
        println!(
            "Duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
    }

    println!("\nStreams: {}", info.streams.len());
    for stream in &info.streams {
        print!(
            "  [{}] {:?} {}",
            stream.index,
            stream.codec_type,
            stream.codec_name.as_deref().unwrap_or("unknown")
        );
        if let Some(ref profile) = stream.profile {
            print!(" profile={}", profile);
        }
        if let Some(ref level) = stream.level {
            print!(" level={}", level);
        }
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            print!(" {}x{}", w, h);
        }
        println!();
    }

    let policy = CopyPolicy {
        allow_hevc_copy: config.conversion.allow_hevc_copy,
    };
    let caps = classify_copyability(Some(&info), policy);
    println!(
        "\nStream copy: video {}, audio {}",
        yes_no(caps.video_copyable),
        yes_no(caps.audio_copyable)
    );

    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

async fn plan_file(
    file: &Path,
    encode: &EncodeArgs,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    ensure_file(file)?;
    let config = config::load_config_or_default(config_path)?;
    let manager = TranscodeManager::new(&config)?;

    let plan = manager.plan(file, &encode.options()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Plan: {}", plan.label());
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }
    Ok(())
}

async fn transcode_file(
    file: &Path,
    output: Option<&Path>,
    remux: bool,
    encode: &EncodeArgs,
    config_path: Option<&Path>,
) -> Result<()> {
    ensure_file(file)?;
    let config = config::load_config_or_default(config_path)?;
    let manager = TranscodeManager::new(&config)?;

    let handle = match output {
        Some(output) if remux => manager.fast_remux(file, output).await?,
        Some(output) => manager.transcode(file, output, &encode.options()).await?,
        None => match manager.transcode_cached_with(file, &encode.options()).await? {
            CachedTranscode::Ready(path) => {
                println!("Already cached: {}", path.display());
                return Ok(());
            }
            CachedTranscode::InProgress { id, output } => {
                anyhow::bail!("Job {} is already writing {}", id, output.display());
            }
            CachedTranscode::Started(handle) => handle,
        },
    };

    wait_for_job(&manager, handle).await
}

async fn wait_for_job(manager: &TranscodeManager, handle: JobHandle) -> Result<()> {
    let id = handle.id;
    println!("Job {} writing {}", id, handle.output_path.display());

    tokio::select! {
        result = handle.wait() => {
            let output = result.with_context(|| format!("Job {} did not complete", id))?;
            println!("Done: {}", output.display());
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = %id, "Interrupted, cancelling job");
            manager.cancel(&id).await;
            anyhow::bail!("Transcode cancelled");
        }
    }
}

async fn cleanup_cache(max_age_hours: Option<u64>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let max_age_hours = max_age_hours.unwrap_or(config.cache.max_age_hours);

    let cache = TranscodeCache::new(&config.cache.dir).with_context(|| {
        format!("Failed to open cache directory: {}", config.cache.dir.display())
    })?;
    let report = cache.cleanup(hours(max_age_hours)).await;

    println!(
        "Scanned {} entries, removed {}, failed {}",
        report.scanned, report.removed, report.failed
    );
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let ffmpeg = resolve_tool("ffmpeg", config.tools.ffmpeg_path.as_deref());
    let ffprobe = resolve_tool("ffprobe", config.tools.ffprobe_path.as_deref());
    let tools = reelcast_av::check_tools(&ffmpeg, &ffprobe);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable transcoding.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_summary(&Config::default());
        }
    }

    Ok(())
}

fn print_summary(config: &Config) {
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Media root: {}", config.media.root.display());
    println!(
        "  Cache: {} (max age {}h)",
        config.cache.dir.display(),
        config.cache.max_age_hours
    );
    println!(
        "  Encoding: preset {}, crf {}, audio {}k",
        config.conversion.video_preset,
        config.conversion.video_crf,
        config.conversion.audio_bitrate_kbps
    );
}
