//! Job definitions for queue processing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote engine used for image-to-video generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoEngine {
    /// Luma Dream Machine (keyframe image + prompt)
    #[default]
    Luma,
    /// Runway Gen-3 Turbo via the FAL queue
    Runway,
}

impl VideoEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoEngine::Luma => "luma",
            VideoEngine::Runway => "runway",
        }
    }
}

impl fmt::Display for VideoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoEngine {
    type Err = EngineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "luma" => Ok(VideoEngine::Luma),
            "runway" => Ok(VideoEngine::Runway),
            _ => Err(EngineParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown video engine: {0}")]
pub struct EngineParseError(String);

/// Kind of pipeline a job runs. Used for status records and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TrainLora,
    GenerateLoraImages,
    GenerateProductVideos,
    GenerateSong,
    DescribeBroll,
    ComposeCommercial,
    RunPipeline,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::TrainLora => "train_lora",
            JobKind::GenerateLoraImages => "generate_lora_images",
            JobKind::GenerateProductVideos => "generate_product_videos",
            JobKind::GenerateSong => "generate_song",
            JobKind::DescribeBroll => "describe_broll",
            JobKind::ComposeCommercial => "compose_commercial",
            JobKind::RunPipeline => "run_pipeline",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A job to be processed by the worker.
///
/// Every variant carries its own `job_id` and the `session_id` of the
/// workspace directory its artifacts land in. File paths are workspace
/// paths produced by an earlier step or an upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Train a LoRA from a zip of product images.
    TrainLora {
        job_id: JobId,
        session_id: String,
        /// Path to the uploaded image archive
        archive_path: String,
        /// Token the trained weights respond to
        trigger_word: String,
        /// Training steps
        #[serde(default = "default_training_steps")]
        steps: u32,
    },

    /// Generate styled product stills through a trained LoRA.
    GenerateLoraImages {
        job_id: JobId,
        session_id: String,
        /// URL of the trained LoRA weights
        lora_url: String,
        /// Trigger word baked into each prompt
        trigger_word: String,
        /// Prompts to render, one image each
        prompts: Vec<String>,
    },

    /// Animate product stills into short commercial clips.
    GenerateProductVideos {
        job_id: JobId,
        session_id: String,
        /// Source images, at most five are used
        image_paths: Vec<String>,
        /// Generation prompt shared by every clip
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default)]
        engine: VideoEngine,
    },

    /// Generate a backing track.
    GenerateSong {
        job_id: JobId,
        session_id: String,
        prompt: String,
        #[serde(default)]
        make_instrumental: bool,
    },

    /// Cut the b-roll library and describe each cut.
    DescribeBroll {
        job_id: JobId,
        session_id: String,
    },

    /// Sequence product clips (and optionally b-roll) into the final
    /// commercial with a backing track.
    ComposeCommercial {
        job_id: JobId,
        session_id: String,
        /// Directory of product clips to sequence
        video_dir: String,
        /// Backing track path
        audio_path: String,
        /// Product description fed to the sequencing model
        product_description: String,
        /// Whether to weave in described b-roll cuts
        #[serde(default)]
        use_broll: bool,
    },

    /// Headless end-to-end run: background, cutout, composite, video.
    RunPipeline {
        job_id: JobId,
        session_id: String,
        /// Product photo to build the commercial around
        product_image: String,
        background_prompt: String,
        video_prompt: String,
    },
}

fn default_training_steps() -> u32 {
    1000
}

impl QueueJob {
    /// Get the job ID.
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::TrainLora { job_id, .. }
            | QueueJob::GenerateLoraImages { job_id, .. }
            | QueueJob::GenerateProductVideos { job_id, .. }
            | QueueJob::GenerateSong { job_id, .. }
            | QueueJob::DescribeBroll { job_id, .. }
            | QueueJob::ComposeCommercial { job_id, .. }
            | QueueJob::RunPipeline { job_id, .. } => job_id,
        }
    }

    /// Get the session ID.
    pub fn session_id(&self) -> &str {
        match self {
            QueueJob::TrainLora { session_id, .. }
            | QueueJob::GenerateLoraImages { session_id, .. }
            | QueueJob::GenerateProductVideos { session_id, .. }
            | QueueJob::GenerateSong { session_id, .. }
            | QueueJob::DescribeBroll { session_id, .. }
            | QueueJob::ComposeCommercial { session_id, .. }
            | QueueJob::RunPipeline { session_id, .. } => session_id,
        }
    }

    /// Get the job kind.
    pub fn kind(&self) -> JobKind {
        match self {
            QueueJob::TrainLora { .. } => JobKind::TrainLora,
            QueueJob::GenerateLoraImages { .. } => JobKind::GenerateLoraImages,
            QueueJob::GenerateProductVideos { .. } => JobKind::GenerateProductVideos,
            QueueJob::GenerateSong { .. } => JobKind::GenerateSong,
            QueueJob::DescribeBroll { .. } => JobKind::DescribeBroll,
            QueueJob::ComposeCommercial { .. } => JobKind::ComposeCommercial,
            QueueJob::RunPipeline { .. } => JobKind::RunPipeline,
        }
    }

    /// Key used for enqueue deduplication.
    ///
    /// Training dedups on content (same archive + trigger word resubmitted
    /// while a run is in flight is the same work); b-roll description dedups
    /// per session. Generation jobs are expected to produce fresh output on
    /// every submission, so their key includes the job ID.
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::TrainLora {
                archive_path,
                trigger_word,
                ..
            } => {
                let archive_name = std::path::Path::new(archive_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| archive_path.clone());
                format!("train:{}:{}", trigger_word, archive_name)
            }
            QueueJob::DescribeBroll { session_id, .. } => {
                format!("describe:{}", session_id)
            }
            other => format!("{}:{}", other.kind(), other.job_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generation() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_queue_job_serialization_tag() {
        let job = QueueJob::GenerateSong {
            job_id: JobId::from_string("j1"),
            session_id: "song_20240101_120000".into(),
            prompt: "upbeat synthwave".into(),
            make_instrumental: true,
        };

        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"type\":\"generate_song\""));

        let back: QueueJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id().as_str(), "j1");
        assert_eq!(back.kind(), JobKind::GenerateSong);
    }

    #[test]
    fn test_train_dedup_is_content_based() {
        let make = |job_id: &str| QueueJob::TrainLora {
            job_id: JobId::from_string(job_id),
            session_id: "train_20240101_120000".into(),
            archive_path: "/data/uploads/product_shots.zip".into(),
            trigger_word: "ACMEBAG".into(),
            steps: 1000,
        };

        assert_eq!(make("a").idempotency_key(), make("b").idempotency_key());
    }

    #[test]
    fn test_song_dedup_is_per_submission() {
        let make = |job_id: &str| QueueJob::GenerateSong {
            job_id: JobId::from_string(job_id),
            session_id: "s".into(),
            prompt: "same prompt".into(),
            make_instrumental: false,
        };

        assert_ne!(make("a").idempotency_key(), make("b").idempotency_key());
    }

    #[test]
    fn test_engine_round_trip() {
        assert_eq!("luma".parse::<VideoEngine>().unwrap(), VideoEngine::Luma);
        assert_eq!("Runway".parse::<VideoEngine>().unwrap(), VideoEngine::Runway);
        assert!("sora".parse::<VideoEngine>().is_err());
        assert_eq!(VideoEngine::Runway.to_string(), "runway");
    }

    #[test]
    fn test_default_engine_on_deserialize() {
        let json = r#"{
            "type": "generate_product_videos",
            "job_id": "j1",
            "session_id": "s1",
            "image_paths": ["a.png"]
        }"#;
        let job: QueueJob = serde_json::from_str(json).unwrap();
        match job {
            QueueJob::GenerateProductVideos { engine, prompt, .. } => {
                assert_eq!(engine, VideoEngine::Luma);
                assert!(prompt.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }
}
