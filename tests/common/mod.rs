//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which owns a temporary media root and cache
//! directory and a full [`AppContext`] around them. The encoder is whatever
//! program the test supplies; [`stub_encoder`] writes shell scripts that
//! stand in for ffmpeg.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use reelcast::cache::TranscodeCache;
use reelcast::config::Config;
use reelcast::conversion::{Encoder, TranscodeManager};
use reelcast::server::{create_router, AppContext};
use reelcast_av::{CodecType, FormatInfo, MediaProber, MediaStreamInfo, StreamDescriptor};
use tempfile::TempDir;

/// Prober returning a fixed result.
pub struct StubProber(pub Option<MediaStreamInfo>);

#[async_trait]
impl MediaProber for StubProber {
    async fn probe(&self, path: &Path) -> reelcast_av::Result<MediaStreamInfo> {
        match &self.0 {
            Some(info) => Ok(MediaStreamInfo {
                file_path: path.to_path_buf(),
                ..info.clone()
            }),
            None => Err(reelcast_av::Error::tool_failed(
                "ffprobe",
                "Invalid data found when processing input",
            )),
        }
    }
}

/// H.264 High 4.0 video with the given audio codec and duration.
pub fn h264_info(audio_codec: &str, duration: Duration) -> MediaStreamInfo {
    let stream = |index, codec_type, codec: &str| StreamDescriptor {
        index,
        codec_type,
        codec_name: Some(codec.to_string()),
        profile: None,
        level: None,
        width: None,
        height: None,
        raw: serde_json::Value::Null,
    };

    let mut video = stream(0, CodecType::Video, "h264");
    video.profile = Some("High".to_string());
    video.level = Some("40".to_string());
    video.width = Some(1920);
    video.height = Some(1080);

    MediaStreamInfo {
        file_path: PathBuf::new(),
        format: Some(FormatInfo {
            format_name: "matroska,webm".to_string(),
            duration: Some(duration),
            size: None,
            bit_rate: None,
        }),
        streams: vec![video, stream(1, CodecType::Audio, audio_codec)],
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub media: TempDir,
    pub cache: TempDir,
}

impl TestHarness {
    /// Harness whose encoder binary does not exist.
    pub fn new() -> Self {
        Self::with_parts(PathBuf::from("/nonexistent/reelcast-ffmpeg"), None)
    }

    pub fn with_parts(encoder: PathBuf, probe_result: Option<MediaStreamInfo>) -> Self {
        let media = TempDir::new().expect("failed to create media dir");
        let cache = TempDir::new().expect("failed to create cache dir");

        let mut config = Config::default();
        config.media.root = media.path().to_path_buf();
        config.cache.dir = cache.path().to_path_buf();

        let transcoder = TranscodeManager::with_parts(
            Arc::new(StubProber(probe_result)),
            Encoder::new(encoder),
            Arc::new(TranscodeCache::new(cache.path()).expect("failed to open cache")),
            config.conversion.clone(),
        );

        Self {
            ctx: AppContext::new(config, transcoder),
            media,
            cache,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    pub fn transcoder(&self) -> &TranscodeManager {
        &self.ctx.transcoder
    }

    /// Write a file below the media root.
    pub fn write_media(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.media.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Start an Axum server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = harness.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Write an executable shell script standing in for ffmpeg.
///
/// `$out` holds the last argument, which is always the output path.
#[cfg(unix)]
pub fn stub_encoder(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!("#!/bin/sh\nfor out; do :; done\n{}\n", body);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
