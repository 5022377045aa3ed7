use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while dispatching chat completions.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("API key for {service} is not configured (set {var})")]
    MissingKey { service: String, var: String },

    #[error("Cannot dispatch an empty message list")]
    EmptyMessages,

    #[error("{service} request failed{}: {message}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    RequestFailed {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{service} returned an empty reply")]
    EmptyResponse { service: String },

    #[error("Model reply contained no parseable JSON{}", quarantined.as_ref().map(|p| format!(" (reply saved to {})", p.display())).unwrap_or_default())]
    JsonExtraction { quarantined: Option<PathBuf> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn missing_key(service: impl Into<String>, var: impl Into<String>) -> Self {
        Self::MissingKey {
            service: service.into(),
            var: var.into(),
        }
    }

    pub fn request_failed(
        service: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    pub fn empty_response(service: impl Into<String>) -> Self {
        Self::EmptyResponse {
            service: service.into(),
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;
