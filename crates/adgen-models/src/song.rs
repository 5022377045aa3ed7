//! Song clip records from the music gateway.

use serde::{Deserialize, Serialize};

/// One generated song clip, as the pipelines consume it.
///
/// The gateway returns a larger payload; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongClip {
    pub id: String,
    /// Gateway state: `submitted`, `queued`, `streaming`, `complete`, `error`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lyric: Option<String>,
}

impl SongClip {
    /// Whether audio can be downloaded for this clip.
    ///
    /// `streaming` is the first state with a usable `audio_url`; `complete`
    /// follows once rendering finishes.
    pub fn is_ready(&self) -> bool {
        matches!(self.status.as_str(), "streaming" | "complete")
    }

    /// Whether the gateway gave up on this clip.
    pub fn is_failed(&self) -> bool {
        self.status == "error"
    }
}

/// Remaining generation quota reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongQuota {
    #[serde(default)]
    pub credits_left: i64,
    #[serde(default)]
    pub monthly_limit: i64,
    #[serde(default)]
    pub monthly_usage: i64,
}
