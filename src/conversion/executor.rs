//! Encoder process supervision.
//!
//! One ffmpeg process per job. The process is owned by a supervisor task
//! that collects the tail of stderr, follows `-progress` output, and
//! reports a single terminal result.

use super::jobs::{JobEntry, JobId, JobStatus, JobTable};
use super::plan::{encoder_args, TranscodePlan};
use chrono::Utc;
use reelcast_av::command::{reap, tool_name};
use reelcast_av::{DiagnosticBuffer, DEFAULT_DIAGNOSTIC_LIMIT};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors surfaced to whoever started a job.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The encoder could not be started; no job was created.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder exited unsuccessfully. Partial output is left on disk.
    #[error("{tool} exited with {status}: {diagnostics}")]
    Failed {
        tool: String,
        status: ExitStatus,
        diagnostics: String,
    },

    #[error("job was cancelled")]
    Cancelled,

    #[error("job supervisor stopped without reporting a result")]
    Lost,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a started job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub output_path: PathBuf,
    status: watch::Receiver<JobStatus>,
    result: oneshot::Receiver<Result<PathBuf, ConversionError>>,
}

impl JobHandle {
    /// Current lifecycle state.
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Wait for the job to finish, returning the output path on success.
    pub async fn wait(self) -> Result<PathBuf, ConversionError> {
        self.result.await.unwrap_or(Err(ConversionError::Lost))
    }
}

/// Where a job's encoder writes and where its output ends up.
///
/// A staged target is written to a scratch path and renamed into place only
/// after the encoder exits successfully, so the final path never holds
/// partial output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    path: PathBuf,
    staging: Option<PathBuf>,
}

impl OutputTarget {
    /// Encoder writes straight to `path`.
    pub fn direct(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging: None,
        }
    }

    /// Encoder writes to `staging`, published to `path` on success.
    pub fn staged(path: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging: Some(staging.into()),
        }
    }

    /// Final output location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File the encoder writes to.
    pub fn write_path(&self) -> &Path {
        self.staging.as_deref().unwrap_or(&self.path)
    }

    async fn publish(&self) -> std::io::Result<()> {
        match self.staging {
            Some(ref staging) => tokio::fs::rename(staging, &self.path).await,
            None => Ok(()),
        }
    }
}

/// Launches encoder processes.
#[derive(Debug, Clone)]
pub struct Encoder {
    program: PathBuf,
    diagnostic_limit: usize,
}

impl Encoder {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
        }
    }

    /// Bytes of stderr kept for failure reports.
    pub fn with_diagnostic_limit(mut self, bytes: usize) -> Self {
        self.diagnostic_limit = bytes;
        self
    }

    /// Start the encoder for `plan` and register the job in `jobs`.
    ///
    /// `duration` is the input's length, used to turn encoder timestamps
    /// into a progress fraction.
    pub fn spawn(
        &self,
        jobs: &JobTable,
        plan: TranscodePlan,
        input: &Path,
        target: OutputTarget,
        duration: Option<Duration>,
    ) -> Result<JobHandle, ConversionError> {
        let tool = tool_name(&self.program);
        let args = encoder_args(&plan, input, target.write_path());
        debug!(tool = %tool, ?args, "Encoder arguments");

        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!(
                    tool = %tool,
                    input = %input.display(),
                    "Failed to start encoder: {}",
                    source
                );
                ConversionError::Spawn {
                    tool: tool.clone(),
                    source,
                }
            })?;

        let id = JobId::new();
        let cancel = CancellationToken::new();

        jobs.insert(
            id,
            JobEntry {
                input: input.to_path_buf(),
                output: target.path().to_path_buf(),
                write_path: target.write_path().to_path_buf(),
                plan: plan.clone(),
                started_at: Utc::now(),
                started: Instant::now(),
                progress: None,
                cancel: cancel.clone(),
                status: status_rx.clone(),
            },
        );
        status_tx.send_replace(JobStatus::Running);

        info!(
            job_id = %id,
            plan = plan.label(),
            input = %input.display(),
            output = %target.write_path().display(),
            "Transcode job started"
        );

        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(supervise(Supervised {
            id,
            child,
            jobs: jobs.clone(),
            cancel,
            status_tx,
            result_tx,
            target: target.clone(),
            duration,
            diagnostic_limit: self.diagnostic_limit,
            tool,
        }));

        let output_path = target.path().to_path_buf();
        Ok(JobHandle {
            id,
            output_path,
            status: status_rx,
            result: result_rx,
        })
    }
}

struct Supervised {
    id: JobId,
    child: Child,
    jobs: JobTable,
    cancel: CancellationToken,
    status_tx: watch::Sender<JobStatus>,
    result_tx: oneshot::Sender<Result<PathBuf, ConversionError>>,
    target: OutputTarget,
    duration: Option<Duration>,
    diagnostic_limit: usize,
    tool: String,
}

async fn supervise(job: Supervised) {
    let Supervised {
        id,
        mut child,
        jobs,
        cancel,
        status_tx,
        result_tx,
        target,
        duration,
        diagnostic_limit,
        tool,
    } = job;

    let stderr = child.stderr.take();
    let diagnostics = tokio::spawn(async move {
        let mut diag = DiagnosticBuffer::new(diagnostic_limit);
        if let Some(stderr) = stderr {
            if let Err(e) = diag.fill_from(stderr).await {
                debug!("Stopped reading encoder stderr: {}", e);
            }
        }
        diag
    });

    let progress = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(track_progress(stdout, jobs.clone(), id, duration)));

    let exit = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    // Whoever removes the entry owns the outcome; cancel() may have won.
    let owned = jobs.remove(&id).is_some();

    if exit.is_none() || matches!(exit, Some(Err(_))) {
        reap(&mut child).await;
    }

    // A cancelled job's output is discarded, so its pipes need not drain.
    if exit.is_none() || !owned {
        diagnostics.abort();
        if let Some(ref progress) = progress {
            progress.abort();
        }
    }

    let diag = diagnostics
        .await
        .unwrap_or_else(|_| DiagnosticBuffer::new(0));
    if let Some(progress) = progress {
        let _ = progress.await;
    }

    let (status, result) = match exit {
        None => {
            info!(job_id = %id, "Transcode job cancelled");
            (JobStatus::Cancelled, Err(ConversionError::Cancelled))
        }
        Some(_) if !owned => {
            info!(job_id = %id, "Transcode job finished after cancellation");
            (JobStatus::Cancelled, Err(ConversionError::Cancelled))
        }
        Some(Ok(exit_status)) if exit_status.success() => match target.publish().await {
            Ok(()) => {
                info!(job_id = %id, output = %target.path().display(), "Transcode job completed");
                (JobStatus::Completed, Ok(target.path().to_path_buf()))
            }
            Err(e) => {
                error!(
                    job_id = %id,
                    output = %target.path().display(),
                    "Failed to move finished output into place: {}",
                    e
                );
                (JobStatus::Failed, Err(ConversionError::Io(e)))
            }
        },
        Some(Ok(exit_status)) => {
            let diagnostics = diag.text().trim().to_string();
            error!(
                job_id = %id,
                status = %exit_status,
                "Transcode job failed: {}",
                diagnostics
            );
            (
                JobStatus::Failed,
                Err(ConversionError::Failed {
                    tool,
                    status: exit_status,
                    diagnostics,
                }),
            )
        }
        Some(Err(e)) => {
            error!(job_id = %id, "Failed waiting for encoder: {}", e);
            (JobStatus::Failed, Err(ConversionError::Io(e)))
        }
    };

    status_tx.send_replace(status);
    if result_tx.send(result).is_err() {
        debug!(job_id = %id, "Job handle dropped before completion");
    }
}

async fn track_progress(
    stdout: ChildStdout,
    jobs: JobTable,
    id: JobId,
    duration: Option<Duration>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let (Some(position), Some(total)) = (parse_out_time(&line), duration) else {
                    continue;
                };
                if !total.is_zero() {
                    jobs.set_progress(&id, position.as_secs_f64() / total.as_secs_f64());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(job_id = %id, "Stopped reading encoder progress: {}", e);
                break;
            }
        }
    }
}

/// Parse an `out_time_us=` progress line.
///
/// ffmpeg's `out_time_ms` key is also in microseconds.
pub fn parse_out_time(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    if key != "out_time_us" && key != "out_time_ms" {
        return None;
    }
    value.trim().parse::<u64>().ok().map(Duration::from_micros)
}
