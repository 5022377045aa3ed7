//! Worker error types.

use thiserror::Error;

use adgen_llm::LlmError;
use adgen_providers::ProviderError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job timed out after {0} seconds")]
    JobTimeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] adgen_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] adgen_media::MediaError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Queue error: {0}")]
    Queue(#[from] adgen_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Retryable errors come from flaky remote calls where a later attempt
    /// can succeed. Validation problems, bad payloads, and local tooling
    /// failures go straight to the dead letter stream.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(e) => matches!(
                e,
                ProviderError::Timeout { .. }
                    | ProviderError::Network(_)
                    | ProviderError::RequestFailed { .. }
            ),
            WorkerError::Llm(e) => matches!(
                e,
                LlmError::Network(_)
                    | LlmError::RequestFailed { .. }
                    | LlmError::EmptyResponse { .. }
            ),
            WorkerError::Storage(_) | WorkerError::Queue(_) => true,
            WorkerError::JobTimeout(_) => true,
            _ => false,
        }
    }
}
