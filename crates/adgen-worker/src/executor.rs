//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use adgen_models::QueueJob;
use adgen_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::pipelines;
use crate::retry::FailureTracker;
use crate::tracker::JobTracker;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> WorkerResult<Self> {
        config.validate()?;

        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Ok(Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        })
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let ctx = Arc::new(PipelineContext::new(self.config.clone()).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Spawn a task to reclaim entries whose consumer died mid-job.
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = Arc::clone(&ctx);
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let mut shutdown_rx_claim = self.shutdown.subscribe();
        let claim_interval = self.config.claim_interval;

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let min_idle = queue_clone.visibility_timeout();
                        match queue_clone.claim_stale(&consumer_name, min_idle, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} stale jobs", jobs.len());
                                for (entry_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) = semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, entry_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim stale jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop.
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_one(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Drain window elapsed with jobs still running, another worker will reclaim them");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Pull one job off the stream and hand it to a worker slot.
    async fn consume_one(&self, ctx: &Arc<PipelineContext>) -> WorkerResult<()> {
        if self.job_semaphore.available_permits() == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let Some((entry_id, job)) = self.queue.dequeue(&self.consumer_name).await? else {
            return Ok(());
        };

        debug!(job_id = %job.job_id(), kind = %job.kind(), "Dequeued job");

        let ctx = Arc::clone(ctx);
        let queue = Arc::clone(&self.queue);
        let permit = self
            .job_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_job(ctx, queue, entry_id, job).await;
        });

        Ok(())
    }

    /// Execute a single job with heartbeats, retry, and dead letter handling.
    async fn execute_job(
        ctx: Arc<PipelineContext>,
        queue: Arc<JobQueue>,
        entry_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().clone();
        let kind = job.kind();
        info!(job_id = %job_id, kind = %kind, "Executing job");

        let tracker =
            Arc::new(JobTracker::new(&job, queue.status().clone(), ctx.progress.clone()).await);
        tracker.started().await;

        // Refresh the heartbeat while the pipeline grinds through slow
        // provider calls, so the record never looks stale mid-run.
        let hb_tracker = Arc::clone(&tracker);
        let hb_interval = ctx.config.heartbeat_interval;
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(hb_interval);
            interval.tick().await;
            let mut failures = FailureTracker::new(3);
            loop {
                interval.tick().await;
                match hb_tracker.heartbeat().await {
                    Ok(()) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(job_id = %hb_tracker.job_id(), error = %e, "Heartbeat write failed");
                        }
                    }
                }
            }
        });

        let started = Instant::now();
        let job_timeout = ctx.config.job_timeout;

        // The pipeline runs in its own task so a panic is contained and
        // reported instead of taking the executor slot down with it.
        let pipe_ctx = Arc::clone(&ctx);
        let pipe_tracker = Arc::clone(&tracker);
        let pipe_job = job.clone();
        let handle =
            tokio::spawn(async move { pipelines::execute(&pipe_ctx, &pipe_tracker, &pipe_job).await });
        let abort = handle.abort_handle();

        let result = match tokio::time::timeout(job_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(WorkerError::job_failed(join_failure(join_err))),
            Err(_) => {
                abort.abort();
                Err(WorkerError::JobTimeout(job_timeout.as_secs()))
            }
        };

        heartbeat_task.abort();

        let duration = started.elapsed();
        histogram!("adgen_worker_job_duration_seconds", "kind" => kind.as_str())
            .record(duration.as_secs_f64());

        match result {
            Ok(()) => {
                info!(job_id = %job_id, elapsed_secs = duration.as_secs(), "Job completed");
                counter!("adgen_worker_jobs_total", "kind" => kind.as_str(), "outcome" => "completed")
                    .increment(1);

                tracker.complete().await;
                if let Err(e) = queue.ack(&entry_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack job");
                }
                // Clear dedup key so the same work can be submitted again
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!(job_id = %job_id, error = %e, "Failed to clear dedup key");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job failed");

                let retry_count = queue.increment_retry(&job_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if e.is_retryable() && retry_count < max_retries {
                    counter!("adgen_worker_jobs_total", "kind" => kind.as_str(), "outcome" => "retried")
                        .increment(1);
                    info!(
                        job_id = %job_id,
                        "Job will be retried (attempt {}/{})", retry_count, max_retries
                    );
                    tracker
                        .retry_scheduled(retry_count, max_retries, &e.to_string())
                        .await;
                    // The entry stays pending; the reclaim task redelivers
                    // it once the visibility timeout passes.
                } else {
                    counter!("adgen_worker_jobs_total", "kind" => kind.as_str(), "outcome" => "failed")
                        .increment(1);
                    if retry_count >= max_retries {
                        warn!(
                            job_id = %job_id,
                            "Job exceeded max retries ({}), dead lettering", max_retries
                        );
                    }

                    match queue.dead_letter(&entry_id, &job, &e.to_string()).await {
                        Ok(()) => {
                            ctx.progress.error(&job_id, e.to_string()).await.ok();
                        }
                        Err(dead_err) => {
                            error!(job_id = %job_id, error = %dead_err, "Failed to dead letter job");
                            // The move failed, so the record was not failed
                            // for us. Do it here rather than leave the job
                            // showing as processing forever.
                            tracker.fail(&e.to_string()).await;
                        }
                    }
                    if let Err(e) = queue.clear_dedup(&job).await {
                        warn!(job_id = %job_id, error = %e, "Failed to clear dedup key");
                    }
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Human-readable reason for a pipeline task that never returned.
fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        match err.try_into_panic() {
            Ok(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                format!("Pipeline panicked: {msg}")
            }
            Err(e) => format!("Pipeline panicked: {e}"),
        }
    } else {
        "Pipeline task was cancelled".to_string()
    }
}
