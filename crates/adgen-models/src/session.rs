//! Session identifiers and timestamp naming.
//!
//! Every pipeline run writes into a session directory named
//! `<prefix>_<timestamp>`; artifacts inside reuse the same timestamp
//! convention.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp fragment used in session and artifact names.
pub fn session_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Identifier of a pipeline session (and its workspace directory).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a new session ID with the given prefix.
    pub fn new(prefix: &str) -> Self {
        Self(format!("{}_{}", prefix, session_timestamp()))
    }

    /// Wrap an existing ID. Use `is_valid` before trusting operator input.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ID is shaped like a session ID and safe to use as a
    /// directory name. Rejects separators and traversal outright.
    pub fn is_valid(&self) -> bool {
        if self.0.is_empty() || self.0.len() > 128 {
            return false;
        }
        if self.0.starts_with('.') {
            return false;
        }
        self.0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
