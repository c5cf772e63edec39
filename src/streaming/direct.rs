//! Direct streaming with HTTP range requests.
//!
//! Serves media files from disk, reading with a chunk size picked from the
//! file size so multi-gigabyte files never sit in memory.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use std::io::SeekFrom;
use std::path::{Component, Path as FsPath, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::range::{resolve_range, ByteRange};
use crate::config::StreamingConfig;
use crate::server::AppContext;

/// Serve a file below the media root with range request support.
pub async fn stream_media(
    State(ctx): State<AppContext>,
    Path(rel_path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let file_path =
        resolve_media_path(&ctx.config.media.root, &rel_path).ok_or(StatusCode::BAD_REQUEST)?;

    let range = headers.get(header::RANGE).and_then(|h| h.to_str().ok());

    serve_file(&file_path, range, &ctx.config.streaming).await
}

/// Build a 200, 206 or 416 response for `file_path`.
pub async fn serve_file(
    file_path: &FsPath,
    range: Option<&str>,
    streaming: &StreamingConfig,
) -> Result<Response, StatusCode> {
    let metadata = tokio::fs::metadata(file_path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    if !metadata.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }

    let file_size = metadata.len();
    let chunk = to_capacity(streaming.chunk_size(file_size));
    let content_type = determine_content_type(file_path);

    let byte_range = match resolve_range(range, file_size, streaming) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(path = %file_path.display(), "Rejecting range request: {}", e);
            return unsatisfiable(file_size);
        }
    };

    let mut file = File::open(file_path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    match byte_range {
        ByteRange::Partial(window) => {
            let length = window.len();

            file.seek(SeekFrom::Start(window.start))
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            let capacity = chunk.min(to_capacity(length));
            let stream = ReaderStream::with_capacity(file.take(length), capacity);
            let body = Body::from_stream(stream);

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(header::CONTENT_RANGE, window.content_range())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
        ByteRange::Full { total_size } => {
            let stream = ReaderStream::with_capacity(file.take(total_size), chunk);
            let body = Body::from_stream(stream);

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, total_size.to_string())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn unsatisfiable(file_size: u64) -> Result<Response, StatusCode> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{}", file_size))
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn to_capacity(bytes: u64) -> usize {
    usize::try_from(bytes).unwrap_or(usize::MAX).max(1)
}

/// Join a request path onto the media root.
///
/// Only plain path segments are accepted, so a request can never escape the
/// root through `..`, a drive prefix or an absolute path.
pub fn resolve_media_path(root: &FsPath, rel_path: &str) -> Option<PathBuf> {
    let rel = FsPath::new(rel_path.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    let mut segments = 0usize;

    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                segments += 1;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    (segments > 0).then_some(resolved)
}

/// Determine content type from the file extension.
fn determine_content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/mp2t",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}
