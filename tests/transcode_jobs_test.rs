//! Job lifecycle tests against stub encoder scripts.
//!
//! The scripts only look at their last argument (the output path), so they
//! accept whatever argument list the plan produces.

#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{h264_info, stub_encoder, wait_until, TestHarness};
use reelcast::cache::TranscodeCache;
use reelcast::conversion::{
    CachedTranscode, ConversionError, JobHandle, JobStatus, QualityPreset, TranscodeOptions,
    TranscodePlan,
};
use serial_test::serial;
use tempfile::TempDir;
use tower::ServiceExt;

const SUCCEED: &str = r#"echo "out_time_us=1000000"
echo "progress=end"
printf 'mp4data' > "$out""#;

const FAIL: &str = r#"printf 'partial' > "$out"
echo "Unknown encoder 'libx264'" >&2
exit 1"#;

const HANG: &str = r#"printf 'partial' > "$out"
echo "out_time_us=500000"
exec sleep 30"#;

#[tokio::test]
#[serial]
async fn successful_job_completes_and_leaves_table() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", SUCCEED), None);
    let input = h.write_media("in.mkv", b"source");
    let output = h.media.path().join("out/in.mp4");

    let handle = h
        .transcoder()
        .execute(TranscodePlan::FastRemux, &input, &output)
        .await
        .unwrap();
    assert_eq!(handle.output_path, output);

    let result = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    assert_eq!(result.unwrap(), output);
    assert_eq!(std::fs::read(&output).unwrap(), b"mp4data");
    assert!(h.transcoder().list_active().is_empty());
}

#[tokio::test]
#[serial]
async fn failed_job_reports_diagnostics_and_keeps_output() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", FAIL), None);
    let input = h.write_media("in.mkv", b"source");
    let output = h.media.path().join("in.mp4");

    let handle = h
        .transcoder()
        .transcode(&input, &output, &TranscodeOptions::default())
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    assert_matches!(result, Err(ConversionError::Failed { ref diagnostics, .. }) => {
        assert!(diagnostics.contains("Unknown encoder"));
    });
    assert_eq!(std::fs::read(&output).unwrap(), b"partial");
    assert!(h.transcoder().list_active().is_empty());
}

#[tokio::test]
#[serial]
async fn cancel_kills_job_and_deletes_output() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", HANG), None);
    let input = h.write_media("in.mkv", b"source");
    let output = h.media.path().join("in.mp4");

    let handle = h.transcoder().fast_remux(&input, &output).await.unwrap();
    let id = handle.id;
    assert_eq!(handle.status(), JobStatus::Running);
    assert!(wait_until(|| output.exists()).await);

    assert!(h.transcoder().cancel(&id).await);
    assert!(!output.exists());
    assert!(!h.transcoder().jobs().contains(&id));
    assert_eq!(handle.status(), JobStatus::Cancelled);
    assert_matches!(handle.wait().await, Err(ConversionError::Cancelled));

    // Second cancel finds nothing.
    assert!(!h.transcoder().cancel(&id).await);
}

#[tokio::test]
#[serial]
async fn active_jobs_report_progress() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(
        stub_encoder(bin.path(), "ffmpeg", HANG),
        Some(h264_info("aac", Duration::from_secs(2))),
    );
    let input = h.write_media("in.mkv", b"source");
    let output = h.media.path().join("in.mp4");

    let handle = h
        .transcoder()
        .transcode(&input, &output, &TranscodeOptions::default())
        .await
        .unwrap();

    let reported = wait_until(|| {
        h.transcoder()
            .list_active()
            .first()
            .and_then(|job| job.progress)
            .is_some()
    })
    .await;
    assert!(reported);

    let jobs = h.transcoder().list_active();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, handle.id);
    assert_eq!(jobs[0].input_path, input);
    assert_eq!(jobs[0].output_path, output);
    assert_eq!(jobs[0].plan, TranscodePlan::FastRemux);
    assert_eq!(jobs[0].progress, Some(0.25));

    assert!(h.transcoder().cancel(&handle.id).await);
    assert!(h.transcoder().list_active().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_jobs_for_same_input_get_distinct_ids() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", HANG), None);
    let input = h.write_media("in.mkv", b"source");
    let output = h.media.path().join("in.mp4");

    let first = h.transcoder().fast_remux(&input, &output).await.unwrap();
    let second = h.transcoder().fast_remux(&input, &output).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(h.transcoder().list_active().len(), 2);

    assert!(h.transcoder().cancel(&first.id).await);
    assert!(h.transcoder().cancel(&second.id).await);
    assert!(h.transcoder().list_active().is_empty());
}

#[tokio::test]
#[serial]
async fn cached_transcode_reports_running_job() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", HANG), None);
    let input = h.write_media("in.mkv", b"source");

    let started = h
        .transcoder()
        .transcode_cached(&input, QualityPreset::Balanced)
        .await
        .unwrap();
    let handle = match started {
        CachedTranscode::Started(handle) => handle,
        other => panic!("expected a new job, got {:?}", other),
    };
    assert!(handle.output_path.starts_with(h.cache.path()));

    let again = h
        .transcoder()
        .transcode_cached(&input, QualityPreset::Balanced)
        .await
        .unwrap();
    assert_matches!(again, CachedTranscode::InProgress { id, ref output } => {
        assert_eq!(id, handle.id);
        assert_eq!(output, &handle.output_path);
    });

    assert!(h.transcoder().cancel(&handle.id).await);
}

async fn start_cached(h: &TestHarness, input: &Path) -> JobHandle {
    match h
        .transcoder()
        .transcode_cached(input, QualityPreset::Balanced)
        .await
        .unwrap()
    {
        CachedTranscode::Started(handle) => handle,
        other => panic!("expected a new job, got {:?}", other),
    }
}

async fn cached_status(h: &TestHarness, key: &str) -> StatusCode {
    let req = Request::builder()
        .uri(format!("/cache/{}", key))
        .body(Body::empty())
        .unwrap();
    h.router().oneshot(req).await.unwrap().status()
}

#[tokio::test]
#[serial]
async fn failed_cached_job_never_becomes_entry() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", FAIL), None);
    let input = h.write_media("in.mkv", b"source");
    let source = std::fs::canonicalize(&input).unwrap();
    let cache = TranscodeCache::new(h.cache.path()).unwrap();

    let handle = start_cached(&h, &input).await;
    assert_eq!(handle.output_path, cache.resolve(&source));
    let result = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    assert_matches!(result, Err(ConversionError::Failed { .. }));

    // Partial output stays behind under the staging name only.
    assert!(!cache.resolve(&source).exists());
    assert_eq!(std::fs::read(cache.staging_path(&source)).unwrap(), b"partial");
    assert!(!cache.has(&source).await);

    let key = TranscodeCache::cache_key(&source);
    assert_eq!(cached_status(&h, &key).await, StatusCode::NOT_FOUND);
    let staged = format!("{}.part", key);
    assert_eq!(cached_status(&h, &staged).await, StatusCode::NOT_FOUND);

    // A retry starts a new job instead of reporting a hit.
    let retry = start_cached(&h, &input).await;
    assert_matches!(retry.wait().await, Err(ConversionError::Failed { .. }));
}

#[tokio::test]
#[serial]
async fn successful_cached_job_publishes_entry() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", SUCCEED), None);
    let input = h.write_media("in.mkv", b"source");
    let source = std::fs::canonicalize(&input).unwrap();
    let cache = TranscodeCache::new(h.cache.path()).unwrap();

    let handle = start_cached(&h, &input).await;
    let output = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output, cache.resolve(&source));
    assert_eq!(std::fs::read(&output).unwrap(), b"mp4data");
    assert!(!cache.staging_path(&source).exists());

    let again = h
        .transcoder()
        .transcode_cached(&input, QualityPreset::Balanced)
        .await
        .unwrap();
    assert_matches!(again, CachedTranscode::Ready(ref path) => assert_eq!(path, &output));

    let key = TranscodeCache::cache_key(&source);
    assert_eq!(cached_status(&h, &key).await, StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn cancelled_cached_job_removes_staged_output() {
    let bin = TempDir::new().unwrap();
    let h = TestHarness::with_parts(stub_encoder(bin.path(), "ffmpeg", HANG), None);
    let input = h.write_media("in.mkv", b"source");
    let source = std::fs::canonicalize(&input).unwrap();
    let cache = TranscodeCache::new(h.cache.path()).unwrap();
    let staging = cache.staging_path(&source);

    let handle = start_cached(&h, &input).await;
    assert!(wait_until(|| staging.exists()).await);

    assert!(h.transcoder().cancel(&handle.id).await);
    assert!(!staging.exists());
    assert!(!cache.resolve(&source).exists());
}

#[tokio::test]
#[serial]
async fn spawn_failure_never_tracks_job() {
    let h = TestHarness::new();
    let input = h.write_media("in.mkv", b"source");

    let result = h
        .transcoder()
        .fast_remux(&input, &h.media.path().join("in.mp4"))
        .await;
    assert_matches!(result, Err(ConversionError::Spawn { .. }));
    assert!(h.transcoder().list_active().is_empty());
}
