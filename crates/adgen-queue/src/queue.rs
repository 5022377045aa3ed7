//! Job queue using Redis Streams.

use std::time::Duration;

use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, error, info, warn};

use adgen_models::{JobId, JobRecord, QueueJob};

use crate::error::{QueueError, QueueResult};
use crate::status::StatusStore;

/// Dedup key lifetime. A resubmission within this window is dropped.
const DEDUP_TTL_SECS: u64 = 3600;

/// Retry counter lifetime.
const RETRY_TTL_SECS: i64 = 86400;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dead_stream_name: String,
    /// Max retries before the dead letter stream
    pub max_retries: u32,
    /// How long a delivered job may sit unacked before another
    /// consumer can claim it
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "adgen:jobs".to_string(),
            consumer_group: "adgen-workers".to_string(),
            dead_stream_name: "adgen:dead".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("ADGEN_QUEUE_STREAM")
                .unwrap_or_else(|_| "adgen:jobs".to_string()),
            consumer_group: std::env::var("ADGEN_QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "adgen-workers".to_string()),
            dead_stream_name: std::env::var("ADGEN_QUEUE_DEAD_STREAM")
                .unwrap_or_else(|_| "adgen:dead".to_string()),
            max_retries: std::env::var("ADGEN_QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            visibility_timeout: Duration::from_secs(
                std::env::var("ADGEN_QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    status: StatusStore,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let status = StatusStore::new(client.clone());
        Ok(Self {
            client,
            config,
            status,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// The status store sharing this queue's connection.
    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    "Consumer group already exists: {}",
                    self.config.consumer_group
                );
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a job and initialize its status record.
    ///
    /// Returns the stream entry ID, or `None` when the job's idempotency
    /// key has been seen within the dedup window.
    pub async fn enqueue(&self, job: &QueueJob) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        // SET NX claims the dedup key and checks for a duplicate in one
        // round trip, so two concurrent submissions cannot both pass.
        let dedup_key = format!("adgen:dedup:{}", idempotency_key);
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Ok(None);
        }

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        self.status.create_record(&JobRecord::new(job)).await?;

        info!("Enqueued job {} with entry ID {}", job.job_id(), entry_id);

        Ok(Some(entry_id))
    }

    /// Pull the next job for a consumer, blocking up to five seconds.
    ///
    /// Malformed payloads are acked and dropped so they cannot wedge the
    /// stream.
    pub async fn dequeue(&self, consumer_name: &str) -> QueueResult<Option<(String, QueueJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(5000)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(job) = self.parse_entry(&entry).await? {
                    debug!("Consumed job {} from stream", job.job_id());
                    return Ok(Some((entry.id, job)));
                }
            }
        }

        Ok(None)
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, entry_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", entry_id);
        Ok(())
    }

    /// Claim pending jobs whose consumer stopped responding.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for entry in reply.claimed {
            if let Some(job) = self.parse_entry(&entry).await? {
                info!("Claimed stale job {} from stream", job.job_id());
                jobs.push((entry.id, job));
            }
        }

        Ok(jobs)
    }

    /// Move a job to the dead letter stream and fail its status record.
    pub async fn dead_letter(
        &self,
        entry_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dead_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Ack the original message
        self.ack(entry_id).await?;

        let mut record = self
            .status
            .get_record(job.job_id().as_str())
            .await?
            .unwrap_or_else(|| JobRecord::new(job));
        record.fail(error);
        self.status.put_record(&record).await?;

        warn!("Moved job {} to dead letter stream: {}", job.job_id(), error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get dead letter stream length.
    pub async fn dead_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dead_stream_name).await?;
        Ok(len)
    }

    /// Release a job's dedup key so the same work can be submitted again.
    ///
    /// Called after a job reaches a terminal state. Until then the key
    /// blocks duplicate submissions of in-flight work.
    pub async fn clear_dedup(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let dedup_key = format!("adgen:dedup:{}", job.idempotency_key());
        conn.del::<_, ()>(&dedup_key).await?;
        Ok(())
    }

    /// Get the retry count for a job.
    pub async fn get_retry_count(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("adgen:retries:{}", job_id);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment the retry count for a job.
    pub async fn increment_retry(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("adgen:retries:{}", job_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_TTL_SECS).await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Visibility timeout from config.
    pub fn visibility_timeout(&self) -> Duration {
        self.config.visibility_timeout
    }

    /// Extract the job payload from a stream entry.
    ///
    /// Entries without a parseable payload are acked so they are never
    /// redelivered.
    async fn parse_entry(&self, entry: &StreamId) -> QueueResult<Option<QueueJob>> {
        let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
            error!("Stream entry {} has no job field, dropping", entry.id);
            self.ack(&entry.id).await.ok();
            return Ok(None);
        };

        let payload_str = String::from_utf8_lossy(payload);
        match serde_json::from_str::<QueueJob>(&payload_str) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!("Failed to parse job payload for {}: {}", entry.id, e);
                self.ack(&entry.id).await.ok();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "adgen:jobs");
        assert_eq!(config.consumer_group, "adgen-workers");
        assert_eq!(config.dead_stream_name, "adgen:dead");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.visibility_timeout, Duration::from_secs(600));
    }
}
