//! Shared data models for the AdGen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Queue jobs and job status records
//! - Generated-media metadata (the Gemini description schema)
//! - Background style presets and video engines
//! - LoRA registry entries and song clips
//! - Progress message schemas

pub mod job;
pub mod job_status;
pub mod lora;
pub mod metadata;
pub mod progress;
pub mod session;
pub mod song;
pub mod style;

// Re-export common types
pub use job::{JobId, JobKind, QueueJob, VideoEngine};
pub use job_status::{JobRecord, JobStatus};
pub use lora::LoraModel;
pub use metadata::VideoMetadata;
pub use progress::ProgressMessage;
pub use session::{session_timestamp, SessionId};
pub use song::{SongClip, SongQuota};
pub use style::{StylePreset, StylePresetParseError};
