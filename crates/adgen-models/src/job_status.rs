//! Job status records for progress tracking and polling.
//!
//! Records are stored in Redis keyed by job ID, so the API can answer
//! status polls without touching the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobKind, QueueJob};

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Queued,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
    /// Worker stopped responding (stale)
    Stale,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stale => "stale",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a job's state, including the artifacts produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub job_id: String,
    /// Pipeline the job runs
    pub kind: JobKind,
    /// Session directory the job writes into
    pub session_id: String,
    /// Current job status
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Current processing step description
    pub current_step: Option<String>,
    /// Workspace-relative paths of produced artifacts
    pub artifacts: Vec<String>,
    /// Error message if the job failed
    pub error_message: Option<String>,
    /// When the job was submitted
    pub started_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
    /// Last heartbeat from the worker
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl JobRecord {
    /// Create a fresh record for a queued job.
    pub fn new(job: &QueueJob) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.job_id().to_string(),
            kind: job.kind(),
            session_id: job.session_id().to_string(),
            status: JobStatus::Queued,
            progress: 0,
            current_step: None,
            artifacts: Vec::new(),
            error_message: None,
            started_at: now,
            updated_at: now,
            last_heartbeat: None,
            event_seq: 0,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update the status and bump the updated_at timestamp.
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Update progress and bump the event sequence.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Describe the step currently running.
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.current_step = Some(step.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Record a produced artifact (workspace-relative path).
    pub fn add_artifact(&mut self, path: impl Into<String>) {
        self.artifacts.push(path.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Update the heartbeat timestamp.
    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark the job as completed.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = Some("Complete".into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Mark the job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Mark the job as stale (worker timeout).
    pub fn mark_stale(&mut self) {
        self.status = JobStatus::Stale;
        self.error_message =
            Some("Processing timed out. The worker may have crashed. Please try again.".into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Check if the job should be considered stale based on heartbeat.
    ///
    /// A job is stale if it is not terminal and either no heartbeat arrived
    /// within the grace period, or the last heartbeat is too old.
    pub fn is_stale(&self, stale_threshold_secs: i64, grace_period_secs: i64) -> bool {
        if self.is_terminal() {
            return false;
        }

        let now = Utc::now();
        match self.last_heartbeat {
            Some(hb) => (now - hb).num_seconds() > stale_threshold_secs,
            None => (now - self.started_at).num_seconds() > grace_period_secs,
        }
    }
}
