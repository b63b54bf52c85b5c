//! Job submission boundary
//!
//! `submit` hands an ingestion to tokio's blocking pool and returns a key
//! immediately; progress is read back through `status` or awaited with `wait`.

use crate::adapter::CancellationToken;
use crate::pipeline::{CurationPipeline, IngestReport, IngestRequest};
use crate::upload::{UploadError, UploadRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobKey),

    #[error("No async runtime to run jobs on: {0}")]
    NoRuntime(String),

    #[error("Job task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

pub type JobResult<T> = Result<T, JobError>;

/// Opaque handle to a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(Uuid);

impl JobKey {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded { report: IngestReport },
    /// Stopped between records; `committed` entities remain in the graph
    Cancelled { committed: u64 },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug)]
struct JobEntry {
    name: String,
    status: JobStatus,
    cancel: CancellationToken,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Summary row for listing jobs
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub key: JobKey,
    pub name: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Runs ingestion jobs against one pipeline
#[derive(Debug)]
pub struct JobScheduler {
    pipeline: Arc<CurationPipeline>,
    jobs: Arc<DashMap<JobKey, JobEntry>>,
    handles: DashMap<JobKey, JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new(pipeline: Arc<CurationPipeline>) -> Self {
        Self {
            pipeline,
            jobs: Arc::new(DashMap::new()),
            handles: DashMap::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<CurationPipeline> {
        &self.pipeline
    }

    /// Queue an ingestion; must be called from within a tokio runtime
    pub fn submit(&self, request: IngestRequest) -> JobResult<JobKey> {
        let runtime = Handle::try_current().map_err(|e| JobError::NoRuntime(e.to_string()))?;
        let key = JobKey::new();
        let cancel = CancellationToken::new();
        self.jobs.insert(
            key,
            JobEntry {
                name: request.name.clone(),
                status: JobStatus::Pending,
                cancel: cancel.clone(),
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );
        // handles of jobs that already ran
        self.handles.retain(|_, handle| !handle.is_finished());

        let jobs = self.jobs.clone();
        let pipeline = self.pipeline.clone();
        let handle = runtime.spawn_blocking(move || {
            if cancel.is_cancelled() {
                set_status(&jobs, key, JobStatus::Cancelled { committed: 0 });
                return;
            }
            set_status(&jobs, key, JobStatus::Running);
            info!(job = %key, name = %request.name, format = %request.format, "job started");

            let status = match pipeline.ingest_with(request, &cancel) {
                Ok(report) if report.cancelled => {
                    warn!(job = %key, committed = report.source.instances, "job cancelled");
                    JobStatus::Cancelled {
                        committed: report.source.instances,
                    }
                }
                Ok(report) => {
                    info!(job = %key, outcome = ?report.outcome, records = report.records, "job finished");
                    JobStatus::Succeeded { report }
                }
                Err(e) => {
                    error!(job = %key, error = %e, "job failed");
                    JobStatus::Failed { error: e.to_string() }
                }
            };
            set_status(&jobs, key, status);
        });
        self.handles.insert(key, handle);
        Ok(key)
    }

    /// Validate an upload and queue it
    pub fn submit_upload(&self, upload: UploadRequest) -> JobResult<JobKey> {
        self.submit(upload.into_ingest()?)
    }

    pub fn status(&self, key: JobKey) -> JobResult<JobStatus> {
        self.jobs
            .get(&key)
            .map(|entry| entry.status.clone())
            .ok_or(JobError::NotFound(key))
    }

    /// Ask a job to stop at its next record boundary
    pub fn cancel(&self, key: JobKey) -> JobResult<()> {
        let entry = self.jobs.get(&key).ok_or(JobError::NotFound(key))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Wait for a job to finish and return its final status
    pub async fn wait(&self, key: JobKey) -> JobResult<JobStatus> {
        if let Some((_, handle)) = self.handles.remove(&key) {
            handle.await.map_err(|e| JobError::Aborted(e.to_string()))?;
        }
        self.status(key)
    }

    /// Forget jobs that finished before `finished_before`; returns how many
    pub fn prune(&self, finished_before: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        self.jobs.retain(|_, entry| {
            let expired = entry.finished_at.is_some_and(|at| at < finished_before);
            pruned += usize::from(expired);
            !expired
        });
        self.handles
            .retain(|key, handle| self.jobs.contains_key(key) && !handle.is_finished());
        pruned
    }

    /// Every known job, oldest first
    pub fn jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .iter()
            .map(|entry| JobInfo {
                key: *entry.key(),
                name: entry.name.clone(),
                status: entry.status.clone(),
                submitted_at: entry.submitted_at,
                finished_at: entry.finished_at,
            })
            .collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.key.cmp(&b.key)));
        jobs
    }
}

fn set_status(jobs: &DashMap<JobKey, JobEntry>, key: JobKey, status: JobStatus) {
    if let Some(mut entry) = jobs.get_mut(&key) {
        if status.is_finished() {
            entry.finished_at = Some(Utc::now());
        }
        entry.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InputSet;
    use crate::config::CuratorConfig;
    use crate::graph::CurationGraph;
    use crate::pipeline::IngestOutcome;

    const BLOCK: &[u8] = b"aspirin\n\n\nM  END\n> <CAS>\n50-78-2\n\n$$$$\n";

    fn scheduler() -> JobScheduler {
        let graph = Arc::new(CurationGraph::in_memory().unwrap());
        JobScheduler::new(Arc::new(CurationPipeline::new(graph, CuratorConfig::default())))
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let scheduler = scheduler();
        let request = IngestRequest::new("npc", "sdf", InputSet::memory([("npc.sdf", BLOCK.to_vec())]));
        let key = scheduler.submit(request).unwrap();

        match scheduler.wait(key).await.unwrap() {
            JobStatus::Succeeded { report } => {
                assert_eq!(report.outcome, IngestOutcome::Created);
                assert_eq!(report.source.instances, 1);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(scheduler.jobs().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_reported_out_of_band() {
        let scheduler = scheduler();
        let request = IngestRequest::new("x", "xlsx", InputSet::memory([("x", b"1".to_vec())]));
        let key = scheduler.submit(request).unwrap();
        assert!(matches!(
            scheduler.wait(key).await.unwrap(),
            JobStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn empty_upload_is_never_queued() {
        let scheduler = scheduler();
        let err = scheduler.submit_upload(UploadRequest::default()).unwrap_err();
        assert!(matches!(err, JobError::Upload(UploadError::NothingToUpload)));
        assert!(scheduler.jobs().is_empty());
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let scheduler = scheduler();
        let key: JobKey = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert!(matches!(scheduler.status(key), Err(JobError::NotFound(_))));
        assert!(scheduler.cancel(key).is_err());
    }

    #[tokio::test]
    async fn finished_handles_are_dropped_on_next_submit() {
        let scheduler = scheduler();
        let request = |name: &str| {
            IngestRequest::new(name, "sdf", InputSet::memory([(format!("{}.sdf", name), BLOCK.to_vec())]))
        };
        let first = scheduler.submit(request("npc")).unwrap();
        while !scheduler.handles.get(&first).map_or(true, |h| h.is_finished()) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let second = scheduler.submit(request("other")).unwrap();
        assert!(!scheduler.handles.contains_key(&first));
        assert!(scheduler.handles.contains_key(&second));
        assert!(scheduler.wait(first).await.unwrap().is_finished());
        scheduler.wait(second).await.unwrap();
        assert!(scheduler.handles.is_empty());
    }

    #[tokio::test]
    async fn prune_forgets_jobs_finished_before_the_cutoff() {
        let scheduler = scheduler();
        let request = IngestRequest::new("npc", "sdf", InputSet::memory([("npc.sdf", BLOCK.to_vec())]));
        let key = scheduler.submit(request).unwrap();
        scheduler.wait(key).await.unwrap();

        let finished_at = scheduler.jobs()[0].finished_at.unwrap();
        assert_eq!(scheduler.prune(finished_at), 0);
        assert_eq!(scheduler.jobs().len(), 1);

        assert_eq!(scheduler.prune(finished_at + chrono::Duration::seconds(1)), 1);
        assert!(scheduler.jobs().is_empty());
        assert!(matches!(scheduler.status(key), Err(JobError::NotFound(_))));
    }

    #[test]
    fn submit_outside_a_runtime_fails() {
        let scheduler = scheduler();
        let request = IngestRequest::new("npc", "sdf", InputSet::memory([("npc.sdf", BLOCK.to_vec())]));
        assert!(matches!(scheduler.submit(request), Err(JobError::NoRuntime(_))));
    }
}
