use crate::cache::{hours, CleanupReport, TranscodeCache};
use crate::conversion::{CachedTranscode, JobId, QualityPreset, TranscodeOptions};
use crate::server::AppContext;
use crate::streaming::{resolve_media_path, serve_file};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use reelcast_av::{check_tools, resolve_tool};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", delete(cancel_job))
        .route("/transcode", post(start_transcode))
        .route("/cache/cleanup", post(cleanup_cache))
        .route("/tools", get(get_tools))
}

/// Completed cache entries, served with range support.
pub fn cache_routes() -> Router<AppContext> {
    Router::new().route("/:key", get(serve_cached))
}

async fn list_jobs(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.transcoder.list_active())
}

async fn cancel_job(State(ctx): State<AppContext>, Path(id): Path<JobId>) -> impl IntoResponse {
    if ctx.transcoder.cancel(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Deserialize)]
struct TranscodeRequest {
    /// Source path relative to the media root.
    path: String,
    #[serde(default)]
    preset: QualityPreset,
    /// Overrides layered on top of the preset.
    #[serde(default)]
    options: Option<TranscodeOptions>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum TranscodeResponse {
    Ready { output: PathBuf, url: String },
    InProgress { job_id: JobId, output: PathBuf },
    Started { job_id: JobId, output: PathBuf },
}

async fn start_transcode(
    State(ctx): State<AppContext>,
    Json(payload): Json<TranscodeRequest>,
) -> Result<Response, (StatusCode, String)> {
    let input = resolve_media_path(&ctx.config.media.root, &payload.path).ok_or((
        StatusCode::BAD_REQUEST,
        format!("Invalid media path: {}", payload.path),
    ))?;

    let is_file = tokio::fs::metadata(&input)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err((
            StatusCode::NOT_FOUND,
            format!("File does not exist: {}", payload.path),
        ));
    }

    let options = payload
        .preset
        .options()
        .overlay(&payload.options.unwrap_or_default());

    let outcome = ctx
        .transcoder
        .transcode_cached_with(&input, &options)
        .await
        .map_err(|e| {
            tracing::error!(input = %input.display(), "Failed to start transcode: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let response = match outcome {
        CachedTranscode::Ready(output) => {
            let url = cache_url(&output);
            (StatusCode::OK, Json(TranscodeResponse::Ready { output, url }))
        }
        CachedTranscode::InProgress { id, output } => (
            StatusCode::ACCEPTED,
            Json(TranscodeResponse::InProgress { job_id: id, output }),
        ),
        CachedTranscode::Started(handle) => {
            tracing::info!(
                job_id = %handle.id,
                preset = %payload.preset,
                "Started transcode from API"
            );
            (
                StatusCode::ACCEPTED,
                Json(TranscodeResponse::Started {
                    job_id: handle.id,
                    output: handle.output_path.clone(),
                }),
            )
        }
    };

    Ok(response.into_response())
}

fn cache_url(output: &std::path::Path) -> String {
    let key = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("/cache/{}", key)
}

#[derive(Deserialize)]
struct CleanupRequest {
    max_age_hours: Option<u64>,
}

async fn cleanup_cache(
    State(ctx): State<AppContext>,
    payload: Option<Json<CleanupRequest>>,
) -> Json<CleanupReport> {
    let max_age_hours = payload
        .and_then(|Json(p)| p.max_age_hours)
        .unwrap_or(ctx.config.cache.max_age_hours);
    Json(ctx.transcoder.cache().cleanup(hours(max_age_hours)).await)
}

async fn get_tools(State(ctx): State<AppContext>) -> Result<impl IntoResponse, StatusCode> {
    let ffmpeg = resolve_tool("ffmpeg", ctx.config.tools.ffmpeg_path.as_deref());
    let ffprobe = resolve_tool("ffprobe", ctx.config.tools.ffprobe_path.as_deref());

    let tools = tokio::task::spawn_blocking(move || check_tools(&ffmpeg, &ffprobe))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(tools))
}

async fn serve_cached(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let cache: &TranscodeCache = ctx.transcoder.cache();
    let path = cache.entry_path(&key).ok_or(StatusCode::NOT_FOUND)?;

    // Output still being written is never handed out.
    if ctx.transcoder.jobs().find_by_output(&path).is_some() {
        return Err(StatusCode::CONFLICT);
    }

    let range = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    serve_file(&path, range, &ctx.config.streaming).await
}
