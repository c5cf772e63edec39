//! External tool discovery.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Availability report for one external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool could be executed.
    pub available: bool,
    /// First line of the tool's version banner.
    pub version: Option<String>,
    /// Resolved executable path.
    pub path: Option<PathBuf>,
}

/// Check whether `program` runs and report its version banner.
///
/// ffmpeg and ffprobe take a single-dash `-version` flag.
pub fn check_tool(program: &Path) -> ToolInfo {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string());

    match Command::new(program).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            ToolInfo {
                path: which::which(program).ok(),
                name,
                available: true,
                version,
            }
        }
        _ => ToolInfo {
            name,
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the encoder and the prober.
pub fn check_tools(ffmpeg: &Path, ffprobe: &Path) -> Vec<ToolInfo> {
    vec![check_tool(ffmpeg), check_tool(ffprobe)]
}

/// Require that a tool is on `PATH`, returning its location.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve a tool, preferring a configured path over `PATH` lookup.
///
/// When neither resolves, the bare name is returned so that the spawn itself
/// reports the missing binary.
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        if path.exists() {
            return path.to_path_buf();
        }
        tracing::warn!(tool = name, path = %path.display(), "Configured tool path does not exist");
    }

    require_tool(name).unwrap_or_else(|_| PathBuf::from(name))
}
