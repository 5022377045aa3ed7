//! Worker configuration.

use std::time::Duration;

use adgen_providers::DEFAULT_DESCRIBE_CONCURRENCY;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis connection URL, shared with the queue and progress channel
    pub redis_url: String,
    /// Data root holding sessions and the asset library
    pub data_dir: String,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent video generations within one job
    pub video_parallel: usize,
    /// Maximum concurrent Gemini describe calls within one job
    pub describe_parallel: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout (drain window for in-flight jobs)
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Interval for refreshing a running job's heartbeat
    pub heartbeat_interval: Duration,
    /// Port for the Prometheus exporter, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            data_dir: "./data".to_string(),
            max_concurrent_jobs: 2,
            video_parallel: 5,
            describe_parallel: DEFAULT_DESCRIBE_CONCURRENCY,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            data_dir: std::env::var("ADGEN_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            max_concurrent_jobs: std::env::var("ADGEN_WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            video_parallel: std::env::var("ADGEN_WORKER_VIDEO_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            describe_parallel: std::env::var("ADGEN_WORKER_DESCRIBE_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DESCRIBE_CONCURRENCY),
            job_timeout: Duration::from_secs(
                std::env::var("ADGEN_WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("ADGEN_WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("ADGEN_WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("ADGEN_WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_port: std::env::var("ADGEN_WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Check the knobs an operator can break through the environment.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.data_dir.is_empty() {
            return Err(WorkerError::config_error("ADGEN_DATA_DIR must not be empty"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error(
                "ADGEN_WORKER_MAX_JOBS must be at least 1",
            ));
        }
        if self.video_parallel == 0 {
            return Err(WorkerError::config_error(
                "ADGEN_WORKER_VIDEO_PARALLEL must be at least 1",
            ));
        }
        if self.describe_parallel == 0 {
            return Err(WorkerError::config_error(
                "ADGEN_WORKER_DESCRIBE_PARALLEL must be at least 1",
            ));
        }
        if self.job_timeout.as_secs() == 0 {
            return Err(WorkerError::config_error(
                "ADGEN_WORKER_JOB_TIMEOUT must be at least 1 second",
            ));
        }
        Ok(())
    }
}
