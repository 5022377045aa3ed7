//! Progress message types.
//!
//! Published over Redis pub/sub by the worker and relayed to operator
//! WebSocket connections by the API.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Progress message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// Log line with timestamp
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100)
    Progress { value: u8 },

    /// An artifact finished and is available for download
    ArtifactReady {
        /// Workspace-relative path
        path: String,
    },

    /// Job finished successfully
    Done {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Job failed
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressMessage {
    /// Create a log message.
    pub fn log(message: impl Into<String>) -> Self {
        ProgressMessage::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a progress message.
    pub fn progress(value: u8) -> Self {
        ProgressMessage::Progress {
            value: value.min(100),
        }
    }

    /// Create an artifact notification.
    pub fn artifact(path: impl Into<String>) -> Self {
        ProgressMessage::ArtifactReady { path: path.into() }
    }

    /// Create a done message.
    pub fn done(session_id: impl Into<String>) -> Self {
        ProgressMessage::Done {
            session_id: session_id.into(),
        }
    }

    /// Create an error message, prefixed with a wall-clock stamp.
    pub fn error(message: impl Into<String>) -> Self {
        let now = Utc::now();
        let ts = now.format("%H:%M:%S").to_string();
        ProgressMessage::Error {
            message: format!("[{}] {}", ts, message.into()),
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_tag() {
        let msg = ProgressMessage::log("Cutting b-roll");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"log\""));
        assert!(json.contains("\"message\":\"Cutting b-roll\""));
    }

    #[test]
    fn test_progress_clamps() {
        match ProgressMessage::progress(150) {
            ProgressMessage::Progress { value } => assert_eq!(value, 100),
            _ => panic!("expected Progress"),
        }
    }

    #[test]
    fn test_done_field_rename() {
        let json = serde_json::to_string(&ProgressMessage::done("pipeline_20240101_120000")).unwrap();
        assert!(json.contains("\"sessionId\":\"pipeline_20240101_120000\""));
    }
}
