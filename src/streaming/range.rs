//! HTTP `Range` header resolution.
//!
//! Only the single-range form `bytes=<start>-[<end>]` is served. An open
//! ended range is capped to one read chunk so players fetch large files
//! progressively instead of asking for the whole remainder at once.

use crate::config::StreamingConfig;

/// A satisfiable byte window, `start <= end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl RangeWindow {
    /// Number of bytes in the window (inclusive bounds).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a window holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

/// What part of the file a request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No `Range` header: the whole file with status 200.
    Full { total_size: u64 },
    /// A satisfiable range: status 206.
    Partial(RangeWindow),
}

/// A range request that cannot be served (HTTP 416).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),

    #[error("range not satisfiable for {total_size} byte file")]
    Unsatisfiable { total_size: u64 },
}

/// Resolve an optional `Range` header against a file of `file_size` bytes.
pub fn resolve_range(
    header: Option<&str>,
    file_size: u64,
    streaming: &StreamingConfig,
) -> Result<ByteRange, RangeError> {
    let Some(header) = header else {
        return Ok(ByteRange::Full {
            total_size: file_size,
        });
    };

    let (start, end) = parse_range_header(header)?;

    let end = match end {
        Some(end) => end,
        None => {
            let chunk = streaming.chunk_size(file_size).max(1);
            start
                .saturating_add(chunk - 1)
                .min(file_size.saturating_sub(1))
        }
    };

    if start >= file_size || end >= file_size || start > end {
        return Err(RangeError::Unsatisfiable {
            total_size: file_size,
        });
    }

    Ok(ByteRange::Partial(RangeWindow {
        start,
        end,
        total_size: file_size,
    }))
}

/// Parse `bytes=<start>-[<end>]` into its numeric parts.
fn parse_range_header(header: &str) -> Result<(u64, Option<u64>), RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    if spec.contains(',') {
        return Err(malformed());
    }

    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    // Suffix ranges (`bytes=-500`) are not supported.
    if start.is_empty() {
        return Err(malformed());
    }

    let start: u64 = start.parse().map_err(|_| malformed())?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().map_err(|_| malformed())?)
    };

    Ok((start, end))
}
