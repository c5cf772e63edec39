//! Builder for executing external tool commands with bounded output capture.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default amount of diagnostic output retained per process: 64 KiB.
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 64 * 1024;

/// Tail buffer for a process's diagnostic stream.
///
/// Keeps only the most recent `capacity` bytes; encoders print the useful
/// part of a failure at the end.
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    truncated: bool,
}

impl DiagnosticBuffer {
    /// Create an empty buffer retaining at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(8 * 1024)),
            capacity,
            truncated: false,
        }
    }

    /// Append bytes, discarding the oldest ones past capacity.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            self.truncated |= !chunk.is_empty();
            return;
        }

        let chunk = if chunk.len() > self.capacity {
            self.truncated = true;
            &chunk[chunk.len() - self.capacity..]
        } else {
            chunk
        };

        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.truncated = true;
            self.bytes.drain(..overflow);
        }
        self.bytes.extend(chunk);
    }

    /// Read `reader` to EOF into the buffer.
    pub async fn fill_from<R: AsyncRead + Unpin>(&mut self, mut reader: R) -> std::io::Result<()> {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            self.push(&chunk[..n]);
        }
    }

    /// Whether earlier output was dropped.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Retained output as lossy UTF-8, prefixed with a marker when truncated.
    pub fn text(&self) -> String {
        let (a, b) = self.bytes.as_slices();
        let mut raw = Vec::with_capacity(a.len() + b.len());
        raw.extend_from_slice(a);
        raw.extend_from_slice(b);
        let text = String::from_utf8_lossy(&raw);
        if self.truncated {
            format!("[...] {text}")
        } else {
            text.into_owned()
        }
    }
}

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Tail of standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use reelcast_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> reelcast_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_streams")
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    diagnostic_limit: usize,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Set how many bytes of stderr are kept for error reporting.
    pub fn diagnostic_limit(&mut self, bytes: usize) -> &mut Self {
        self.diagnostic_limit = bytes;
        self
    }

    /// Terminate the process when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// Short name of the program, used in errors and logs.
    pub fn tool_name(&self) -> String {
        tool_name(&self.program)
    }

    /// Execute the command, capturing stdout and the tail of stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::ToolFailed`] if spawning fails or the process exits with a
    ///   non-zero status (message includes the captured stderr).
    /// - [`Error::TimedOut`] / [`Error::Cancelled`] after the process has been
    ///   killed and reaped.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.tool_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| spawn_error(&tool, e))?;
        tracing::trace!(tool = %tool, args = ?self.args, "Spawned tool");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.diagnostic_limit;

        let run = async {
            let read_stdout = async {
                let mut buf = Vec::new();
                if let Some(mut out) = stdout {
                    out.read_to_end(&mut buf).await?;
                }
                Ok::<_, std::io::Error>(buf)
            };
            let read_stderr = async {
                let mut diag = DiagnosticBuffer::new(limit);
                if let Some(err) = stderr {
                    diag.fill_from(err).await?;
                }
                Ok::<_, std::io::Error>(diag)
            };
            tokio::try_join!(read_stdout, read_stderr, child.wait())
        };

        let cancel = self.cancel.clone().unwrap_or_default();
        let outcome = tokio::select! {
            res = tokio::time::timeout(self.timeout, run) => Some(res),
            _ = cancel.cancelled() => None,
        };

        match outcome {
            Some(Ok(Ok((stdout, diag, status)))) => {
                if !status.success() {
                    return Err(Error::tool_failed(
                        tool,
                        format!("exited with status {}: {}", status, diag.text().trim()),
                    ));
                }
                Ok(ToolOutput {
                    status,
                    stdout: String::from_utf8_lossy(&stdout).to_string(),
                    stderr: diag.text(),
                })
            }
            Some(Ok(Err(e))) => {
                reap(&mut child).await;
                Err(Error::tool_failed(
                    tool,
                    format!("I/O error waiting for process: {e}"),
                ))
            }
            Some(Err(_elapsed)) => {
                reap(&mut child).await;
                Err(Error::TimedOut {
                    tool,
                    timeout: self.timeout,
                })
            }
            None => {
                reap(&mut child).await;
                Err(Error::Cancelled { tool })
            }
        }
    }
}

/// Short display name for a program path.
pub fn tool_name(program: &std::path::Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

/// Map a spawn failure to the matching error variant.
pub fn spawn_error(tool: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::tool_not_found(tool)
    } else {
        Error::tool_failed(tool, format!("failed to spawn: {e}"))
    }
}

/// Kill a child (if still running) and wait for it so no zombie is left.
pub async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::trace!("start_kill on finished process: {}", e);
    }
    if let Err(e) = child.wait().await {
        tracing::warn!("Failed to reap child process: {}", e);
    }
}
