//! Progress events via Redis Pub/Sub.
//!
//! The worker publishes [`ProgressMessage`]s on a per-job channel; the API
//! relays them to operator WebSocket connections.

use redis::AsyncCommands;
use tracing::debug;

use adgen_models::{JobId, ProgressMessage};

use crate::error::QueueResult;

/// Channel for publishing/subscribing to job progress.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("adgen:progress:{}", job_id)
    }

    /// Publish a progress message for a job.
    pub async fn publish(&self, job_id: &JobId, message: &ProgressMessage) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(job_id);
        let payload = serde_json::to_string(message)?;

        debug!("Publishing progress message to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a log line.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(job_id, &ProgressMessage::log(message)).await
    }

    /// Publish a progress percentage.
    pub async fn progress(&self, job_id: &JobId, value: u8) -> QueueResult<()> {
        self.publish(job_id, &ProgressMessage::progress(value)).await
    }

    /// Publish an artifact-ready notification.
    pub async fn artifact(&self, job_id: &JobId, path: impl Into<String>) -> QueueResult<()> {
        self.publish(job_id, &ProgressMessage::artifact(path)).await
    }

    /// Publish a done message.
    pub async fn done(&self, job_id: &JobId, session_id: &str) -> QueueResult<()> {
        self.publish(job_id, &ProgressMessage::done(session_id)).await
    }

    /// Publish an error message.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(job_id, &ProgressMessage::error(message)).await
    }

    /// Subscribe to progress messages for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressMessage> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
