//! Per-job status and progress bookkeeping.
//!
//! The tracker owns the in-memory `JobRecord` for one execution and is the
//! only writer of it. Pipelines report steps and artifacts through it, the
//! executor's heartbeat task refreshes liveness through it, so concurrent
//! writers never clobber each other's fields in Redis.

use tokio::sync::Mutex;
use tracing::warn;

use adgen_models::{JobId, JobRecord, JobStatus, QueueJob};
use adgen_queue::{ProgressChannel, QueueResult, StatusStore};

/// Write-through handle for one job's record and progress channel.
///
/// Status writes are best-effort: a failed Redis write is logged and the
/// pipeline keeps going. Losing a progress update is better than failing a
/// half-finished render.
pub struct JobTracker {
    record: Mutex<JobRecord>,
    status: StatusStore,
    progress: ProgressChannel,
    job_id: JobId,
    session_id: String,
}

impl JobTracker {
    /// Create a tracker, resuming the stored record when one exists.
    ///
    /// A redelivered job keeps its artifact list and start time instead of
    /// looking like a fresh submission.
    pub async fn new(job: &QueueJob, status: StatusStore, progress: ProgressChannel) -> Self {
        let record = match status.get_record(job.job_id().as_str()).await {
            Ok(Some(existing)) => existing,
            Ok(None) => JobRecord::new(job),
            Err(e) => {
                warn!(job_id = %job.job_id(), error = %e, "Could not load job record, starting fresh");
                JobRecord::new(job)
            }
        };

        Self {
            record: Mutex::new(record),
            status,
            progress,
            job_id: job.job_id().clone(),
            session_id: job.session_id().to_string(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Mark the job as processing and stamp the first heartbeat.
    pub async fn started(&self) {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.set_status(JobStatus::Processing);
            record.record_heartbeat();
            record.clone()
        };
        self.put(&snapshot).await;
    }

    /// Publish a log line without touching the record.
    pub async fn log(&self, message: impl Into<String>) {
        if let Err(e) = self.progress.log(&self.job_id, message).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to publish log message");
        }
    }

    /// Record the current step and percentage, and publish both.
    pub async fn step(&self, percent: u8, message: &str) {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.set_progress(percent);
            record.set_step(message);
            record.clone()
        };
        self.put(&snapshot).await;

        self.progress.progress(&self.job_id, percent).await.ok();
        self.progress.log(&self.job_id, message).await.ok();
    }

    /// Record a produced artifact (data-root relative path) and announce it.
    pub async fn artifact(&self, rel_path: &str) {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.add_artifact(rel_path);
            record.clone()
        };
        self.put(&snapshot).await;

        self.progress.artifact(&self.job_id, rel_path).await.ok();
    }

    /// Refresh the liveness timestamp.
    ///
    /// Unlike the other writers this propagates the error, so the caller's
    /// failure tracker can decide what is worth logging.
    pub async fn heartbeat(&self) -> QueueResult<()> {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.record_heartbeat();
            record.clone()
        };
        self.status.put_record(&snapshot).await
    }

    /// Terminal success: record completion and publish the done frame.
    pub async fn complete(&self) {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.complete();
            record.clone()
        };
        self.put(&snapshot).await;

        if let Err(e) = self.progress.done(&self.job_id, &self.session_id).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to publish done message");
        }
    }

    /// Terminal failure: record the error and publish it.
    pub async fn fail(&self, error: &str) {
        let snapshot = {
            let mut record = self.record.lock().await;
            record.fail(error);
            record.clone()
        };
        self.put(&snapshot).await;

        if let Err(e) = self.progress.error(&self.job_id, error).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to publish error message");
        }
    }

    /// Put the job back to queued while it waits for redelivery.
    pub async fn retry_scheduled(&self, attempt: u32, max_retries: u32, error: &str) {
        let step = format!("Retry {attempt}/{max_retries} scheduled");
        let snapshot = {
            let mut record = self.record.lock().await;
            record.error_message = Some(error.to_string());
            record.set_status(JobStatus::Queued);
            record.set_step(&step);
            record.clone()
        };
        self.put(&snapshot).await;

        self.progress
            .log(&self.job_id, format!("{step}: {error}"))
            .await
            .ok();
    }

    async fn put(&self, record: &JobRecord) {
        if let Err(e) = self.status.put_record(record).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to write job record");
        }
    }
}
