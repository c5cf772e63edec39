//! In-memory job table.
//!
//! Every mutation goes through one mutex, so an encoder exit and a cancel
//! racing on the same id resolve to exactly one owner: whoever removes the
//! entry first.

use super::plan::TranscodePlan;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job lifecycle: Pending → Running → {Completed | Failed | Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Table entry for a running encoder.
pub(crate) struct JobEntry {
    pub input: PathBuf,
    /// Where the output lands on success.
    pub output: PathBuf,
    /// File the encoder is writing; equal to `output` unless staged.
    pub write_path: PathBuf,
    pub plan: TranscodePlan,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    pub progress: Option<f64>,
    pub cancel: CancellationToken,
    pub status: watch::Receiver<JobStatus>,
}

/// Snapshot of a running job.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub plan: TranscodePlan,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs", rename = "elapsed_secs")]
    pub elapsed: Duration,
    /// Fraction in `0.0..=1.0`, when the input duration is known.
    pub progress: Option<f64>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Shared map of running jobs.
#[derive(Clone, Default)]
pub struct JobTable {
    inner: Arc<Mutex<HashMap<JobId, JobEntry>>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: JobId, entry: JobEntry) {
        self.inner.lock().insert(id, entry);
    }

    /// Take ownership of an entry. `None` means someone else got there first.
    pub(crate) fn remove(&self, id: &JobId) -> Option<JobEntry> {
        self.inner.lock().remove(id)
    }

    pub(crate) fn set_progress(&self, id: &JobId, fraction: f64) {
        if let Some(entry) = self.inner.lock().get_mut(id) {
            entry.progress = Some(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Id of the running job writing to `output`, if any.
    pub fn find_by_output(&self, output: &Path) -> Option<JobId> {
        self.inner
            .lock()
            .iter()
            .find(|(_, entry)| entry.output == output)
            .map(|(id, _)| *id)
    }

    /// Snapshot of every running job, oldest first.
    pub fn snapshot(&self) -> Vec<ActiveJob> {
        let mut jobs: Vec<ActiveJob> = self
            .inner
            .lock()
            .iter()
            .map(|(id, entry)| ActiveJob {
                id: *id,
                input_path: entry.input.clone(),
                output_path: entry.output.clone(),
                plan: entry.plan.clone(),
                started_at: entry.started_at,
                elapsed: entry.started.elapsed(),
                progress: entry.progress,
            })
            .collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(output: &str) -> (JobEntry, watch::Sender<JobStatus>) {
        let (tx, rx) = watch::channel(JobStatus::Running);
        let entry = JobEntry {
            input: PathBuf::from("/in.mkv"),
            output: PathBuf::from(output),
            write_path: PathBuf::from(output),
            plan: TranscodePlan::FastRemux,
            started_at: Utc::now(),
            started: Instant::now(),
            progress: None,
            cancel: CancellationToken::new(),
            status: rx,
        };
        (entry, tx)
    }

    #[test]
    fn test_remove_has_single_owner() {
        let table = JobTable::new();
        let id = JobId::new();
        let (e, _tx) = entry("/out.mp4");
        table.insert(id, e);

        assert!(table.contains(&id));
        assert!(table.remove(&id).is_some());
        assert!(table.remove(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_and_progress() {
        let table = JobTable::new();
        let id = JobId::new();
        let (e, _tx) = entry("/out.mp4");
        table.insert(id, e);
        table.set_progress(&id, 1.7);

        let jobs = table.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].output_path, PathBuf::from("/out.mp4"));
        assert_eq!(jobs[0].progress, Some(1.0));
        // Snapshots do not mutate the table.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_by_output() {
        let table = JobTable::new();
        let id = JobId::new();
        let (e, _tx) = entry("/cache/abc.mp4");
        table.insert(id, e);
        assert_eq!(table.find_by_output(Path::new("/cache/abc.mp4")), Some(id));
        assert_eq!(table.find_by_output(Path::new("/cache/other.mp4")), None);
    }

    #[test]
    fn test_job_id_roundtrip_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
