//! Transcode orchestration.
//!
//! [`TranscodeManager`] ties together the stream inspector, plan selection,
//! the encoder and the job table. It owns no global state; everything it
//! needs comes in through its constructor.

use super::executor::{ConversionError, Encoder, JobHandle, OutputTarget};
use super::jobs::{ActiveJob, JobId, JobTable};
use super::options::{QualityPreset, TranscodeOptions};
use super::plan::{decide_plan, fallback_plan, TranscodePlan};
use crate::cache::TranscodeCache;
use crate::config::{Config, ConversionConfig};
use anyhow::{Context, Result};
use reelcast_av::{classify_copyability, resolve_tool, FfprobeProber, MediaProber};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of [`TranscodeManager::transcode_cached`].
#[derive(Debug)]
pub enum CachedTranscode {
    /// The cached output already exists.
    Ready(PathBuf),
    /// A job is already writing the cached output.
    InProgress { id: JobId, output: PathBuf },
    /// A new job was started.
    Started(JobHandle),
}

/// Plans, starts, lists and cancels transcode jobs.
pub struct TranscodeManager {
    prober: Arc<dyn MediaProber>,
    encoder: Encoder,
    jobs: JobTable,
    cache: Arc<TranscodeCache>,
    defaults: ConversionConfig,
}

impl TranscodeManager {
    /// Build a manager from configuration, resolving tool paths.
    pub fn new(config: &Config) -> Result<Self> {
        let ffprobe = resolve_tool("ffprobe", config.tools.ffprobe_path.as_deref());
        let ffmpeg = resolve_tool("ffmpeg", config.tools.ffmpeg_path.as_deref());
        debug!(ffprobe = %ffprobe.display(), ffmpeg = %ffmpeg.display(), "Resolved media tools");

        let prober = FfprobeProber::new(ffprobe)
            .with_timeout(Duration::from_secs(config.tools.probe_timeout_secs));
        let cache = TranscodeCache::new(&config.cache.dir).with_context(|| {
            format!(
                "Failed to create cache directory: {}",
                config.cache.dir.display()
            )
        })?;

        let encoder = Encoder::new(ffmpeg)
            .with_diagnostic_limit(config.tools.diagnostic_limit_kib.saturating_mul(1024));

        Ok(Self::with_parts(
            Arc::new(prober),
            encoder,
            Arc::new(cache),
            config.conversion.clone(),
        ))
    }

    /// Build a manager from already-constructed parts.
    pub fn with_parts(
        prober: Arc<dyn MediaProber>,
        encoder: Encoder,
        cache: Arc<TranscodeCache>,
        defaults: ConversionConfig,
    ) -> Self {
        Self {
            prober,
            encoder,
            jobs: JobTable::new(),
            cache,
            defaults,
        }
    }

    pub fn cache(&self) -> &Arc<TranscodeCache> {
        &self.cache
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn defaults(&self) -> &ConversionConfig {
        &self.defaults
    }

    /// Choose a processing plan for `input`.
    ///
    /// A probe failure never escapes: it is logged and the plan falls back to
    /// a full transcode with the resolved parameters.
    pub async fn plan(&self, input: &Path, options: &TranscodeOptions) -> TranscodePlan {
        self.inspect(input, options).await.0
    }

    async fn inspect(
        &self,
        input: &Path,
        options: &TranscodeOptions,
    ) -> (TranscodePlan, Option<Duration>) {
        match self.prober.probe(input).await {
            Ok(info) => {
                let policy = options.copy_policy(&self.defaults);
                let caps = classify_copyability(Some(&info), policy);
                let plan = decide_plan(caps, options, &self.defaults);
                debug!(
                    input = %input.display(),
                    video_copyable = caps.video_copyable,
                    audio_copyable = caps.audio_copyable,
                    plan = plan.label(),
                    "Planned transcode"
                );
                (plan, info.duration())
            }
            Err(e) => {
                warn!(
                    input = %input.display(),
                    "Probe failed, falling back to full transcode: {}",
                    e
                );
                (fallback_plan(options, &self.defaults), None)
            }
        }
    }

    /// Start a job running `plan`. Returns as soon as the encoder is running.
    pub async fn execute(
        &self,
        plan: TranscodePlan,
        input: &Path,
        output: &Path,
    ) -> Result<JobHandle, ConversionError> {
        self.start(plan, input, OutputTarget::direct(output), None)
            .await
    }

    /// Plan and start a job in one step.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        options: &TranscodeOptions,
    ) -> Result<JobHandle, ConversionError> {
        let (plan, duration) = self.inspect(input, options).await;
        self.start(plan, input, OutputTarget::direct(output), duration)
            .await
    }

    /// Copy every stream into an MP4 container without probing.
    pub async fn fast_remux(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<JobHandle, ConversionError> {
        let target = OutputTarget::direct(output);
        self.start(TranscodePlan::FastRemux, input, target, None)
            .await
    }

    /// Transcode `input` into its cache slot with a named preset.
    pub async fn transcode_cached(
        &self,
        input: &Path,
        preset: QualityPreset,
    ) -> Result<CachedTranscode, ConversionError> {
        self.transcode_cached_with(input, &preset.options()).await
    }

    /// Transcode `input` into its cache slot, reusing existing work.
    ///
    /// The cache key is derived from the canonical source path when the
    /// source exists, so relative and absolute spellings share one entry.
    /// Options do not take part in the key. The encoder writes to a staging
    /// file beside the entry, so a failed job never creates the entry.
    pub async fn transcode_cached_with(
        &self,
        input: &Path,
        options: &TranscodeOptions,
    ) -> Result<CachedTranscode, ConversionError> {
        let source = tokio::fs::canonicalize(input)
            .await
            .unwrap_or_else(|_| input.to_path_buf());
        let output = self.cache.resolve(&source);

        if let Some(id) = self.jobs.find_by_output(&output) {
            debug!(job_id = %id, output = %output.display(), "Cached output already in progress");
            return Ok(CachedTranscode::InProgress { id, output });
        }

        if self.cache.has(&source).await {
            debug!(source = %source.display(), output = %output.display(), "Cache hit");
            return Ok(CachedTranscode::Ready(output));
        }

        let (plan, duration) = self.inspect(&source, options).await;
        let target = OutputTarget::staged(output, self.cache.staging_path(&source));
        let handle = self.start(plan, &source, target, duration).await?;
        Ok(CachedTranscode::Started(handle))
    }

    async fn start(
        &self,
        plan: TranscodePlan,
        input: &Path,
        target: OutputTarget,
        duration: Option<Duration>,
    ) -> Result<JobHandle, ConversionError> {
        let parent = target.path().parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.encoder.spawn(&self.jobs, plan, input, target, duration)
    }

    /// Cancel a running job.
    ///
    /// Returns `false` when the id is not tracked. Otherwise the encoder is
    /// terminated and its incomplete output deleted once the process is gone.
    pub async fn cancel(&self, id: &JobId) -> bool {
        let Some(entry) = self.jobs.remove(id) else {
            debug!(job_id = %id, "Cancel requested for unknown job");
            return false;
        };

        entry.cancel.cancel();
        let mut status = entry.status;
        if status.wait_for(|s| s.is_terminal()).await.is_err() {
            debug!(job_id = %id, "Job supervisor gone before reporting status");
        }

        match tokio::fs::remove_file(&entry.write_path).await {
            Ok(()) => debug!(
                job_id = %id,
                output = %entry.write_path.display(),
                "Removed partial output"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %id,
                output = %entry.write_path.display(),
                "Failed to remove partial output: {}",
                e
            ),
        }

        info!(
            job_id = %id,
            input = %entry.input.display(),
            "Transcode job cancelled by request"
        );
        true
    }

    /// Snapshot of running jobs.
    pub fn list_active(&self) -> Vec<ActiveJob> {
        self.jobs.snapshot()
    }
}
