//! Transcode output cache.
//!
//! The cache is a flat directory. An entry's filename is derived from the
//! source path string alone, so the same source always maps to the same
//! file across restarts, and the presence of that file is the entry.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Extension of every cached output.
pub const CACHE_EXTENSION: &str = "mp4";

/// Suffix of the file an encoder writes before the entry is published.
pub const STAGING_SUFFIX: &str = "part";

/// Hex digits of the digest kept in the filename.
const KEY_HEX_LEN: usize = 32;

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Entries inspected.
    pub scanned: usize,
    /// Entries deleted.
    pub removed: usize,
    /// Entries that could not be inspected or deleted.
    pub failed: usize,
}

/// Filesystem-backed cache of transcoded files.
#[derive(Debug, Clone)]
pub struct TranscodeCache {
    root: PathBuf,
}

impl TranscodeCache {
    /// Open the cache at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic cache filename for a source path.
    pub fn cache_key(source: &Path) -> String {
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        let mut key = hex::encode(digest);
        key.truncate(KEY_HEX_LEN);
        format!("{}.{}", key, CACHE_EXTENSION)
    }

    /// Path the cached output for `source` lives at, whether or not it exists.
    pub fn resolve(&self, source: &Path) -> PathBuf {
        self.root.join(Self::cache_key(source))
    }

    /// Scratch path an encoder writes to before the output for `source` is
    /// renamed into place. Never accepted by [`Self::entry_path`].
    pub fn staging_path(&self, source: &Path) -> PathBuf {
        let key = Self::cache_key(source);
        self.root.join(format!("{}.{}", key, STAGING_SUFFIX))
    }

    /// Path of an entry given its key, if the key is a plain cache filename.
    pub fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let (stem, ext) = key.split_once('.')?;
        let valid = ext == CACHE_EXTENSION
            && stem.len() == KEY_HEX_LEN
            && stem.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| self.root.join(key))
    }

    /// Whether a cached output exists for `source`.
    pub async fn has(&self, source: &Path) -> bool {
        tokio::fs::metadata(self.resolve(source))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Delete entries last modified at least `max_age` ago.
    ///
    /// Per-entry failures are logged and counted; they never stop the pass.
    pub async fn cleanup(&self, max_age: Duration) -> CleanupReport {
        let mut report = CleanupReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    root = %self.root.display(),
                    "Cache directory missing, nothing to clean"
                );
                return report;
            }
            Err(e) => {
                tracing::warn!(
                    root = %self.root.display(),
                    "Failed to read cache directory: {}",
                    e
                );
                report.failed += 1;
                return report;
            }
        };

        let now = SystemTime::now();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read cache entry: {}", e);
                    report.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to stat cache entry: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }
            report.scanned += 1;

            let modified = match metadata.modified() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        "No modification time for cache entry: {}",
                        e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            // Timestamps in the future count as fresh.
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "Removed cache entry"
                    );
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to remove cache entry: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "Cache cleanup finished"
        );
        report
    }
}

/// Convert an hour count into a cleanup age.
pub fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

/// Spawn a background task running `cleanup` every `interval`.
///
/// Runs are sequential, so passes never overlap.
pub fn start_cleanup_task(
    cache: Arc<TranscodeCache>,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            cache.cleanup(max_age).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_deterministic() {
        let a = TranscodeCache::cache_key(Path::new("/media/movies/film.mkv"));
        let b = TranscodeCache::cache_key(Path::new("/media/movies/film.mkv"));
        assert_eq!(a, b);
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), KEY_HEX_LEN + 4);
    }

    #[test]
    fn test_cache_key_stable_value() {
        // Truncated sha256 of the path string; must not change between releases.
        assert_eq!(
            TranscodeCache::cache_key(Path::new("/media/a.mkv")),
            "93b9aaca13007c8a3e5ae2b8004776ce.mp4"
        );
    }

    #[test]
    fn test_cache_key_distinguishes_paths() {
        assert_ne!(
            TranscodeCache::cache_key(Path::new("/media/a.mkv")),
            TranscodeCache::cache_key(Path::new("/media/b.mkv"))
        );
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = TranscodeCache::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(cache.root(), root.as_path());
    }

    #[test]
    fn test_entry_path_validation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let key = TranscodeCache::cache_key(Path::new("/x.mkv"));
        assert_eq!(cache.entry_path(&key), Some(dir.path().join(&key)));
        assert_eq!(cache.entry_path("../etc/passwd"), None);
        assert_eq!(cache.entry_path("abc.mp4"), None);
    }

    #[test]
    fn test_staging_path_is_not_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let source = Path::new("/media/show.mkv");

        let staging = cache.staging_path(source);
        assert_eq!(staging.parent(), Some(dir.path()));
        assert_ne!(staging, cache.resolve(source));

        let name = staging.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".mp4.part"));
        assert_eq!(cache.entry_path(name), None);
    }

    #[tokio::test]
    async fn test_staged_file_does_not_count_as_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let source = Path::new("/media/show.mkv");

        std::fs::write(cache.staging_path(source), b"partial").unwrap();
        assert!(!cache.has(source).await);
    }

    #[tokio::test]
    async fn test_has_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let source = Path::new("/media/show.mkv");

        assert!(!cache.has(source).await);
        let path = cache.resolve(source);
        assert_eq!(path.parent(), Some(dir.path()));

        std::fs::write(&path, b"data").unwrap();
        assert!(cache.has(source).await);
        assert_eq!(cache.resolve(source), path);
    }

    #[tokio::test]
    async fn test_cleanup_zero_age_removes_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        for name in ["/a.mkv", "/b.mkv", "/c.mkv"] {
            std::fs::write(cache.resolve(Path::new(name)), b"x").unwrap();
        }

        let report = cache.cleanup(Duration::ZERO).await;
        assert_eq!(report.removed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let staging = cache.staging_path(Path::new("/aborted.mkv"));
        std::fs::write(&staging, b"partial").unwrap();

        let report = cache.cleanup(Duration::ZERO).await;
        assert_eq!(report.removed, 1);
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        let path = cache.resolve(Path::new("/fresh.mkv"));
        std::fs::write(&path, b"x").unwrap();

        let report = cache.cleanup(hours(24)).await;
        assert_eq!(report, CleanupReport { scanned: 1, removed: 0, failed: 0 });
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_empty_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path().join("cache")).unwrap();
        assert_eq!(cache.cleanup(Duration::ZERO).await, CleanupReport::default());

        std::fs::remove_dir(cache.root()).unwrap();
        assert_eq!(cache.cleanup(Duration::ZERO).await, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_cleanup_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscodeCache::new(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let report = cache.cleanup(Duration::ZERO).await;
        assert_eq!(report.scanned, 0);
        assert!(dir.path().join("subdir").is_dir());
    }
}
