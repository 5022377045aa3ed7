use thiserror::Error;

/// Errors from the vendor adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{provider} request failed{}: {message}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} generation failed: {detail}")]
    GenerationFailed { provider: String, detail: String },

    #[error("{provider} response is missing {what}")]
    MissingOutput { provider: String, what: String },

    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} did not finish within {waited_secs}s")]
    Timeout { provider: String, waited_secs: u64 },

    #[error("File not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("Media error: {0}")]
    Media(#[from] adgen_media::MediaError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn generation_failed(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::GenerationFailed {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn missing_output(provider: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingOutput {
            provider: provider.into(),
            what: what.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, waited_secs: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            waited_secs,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trim vendor error bodies so they stay log-friendly.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 1000;
    if body.chars().count() > MAX_CHARS {
        let cut: String = body.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}
