//! Session workspace layout and Google Cloud Storage delivery.
//!
//! This crate provides:
//! - Timestamped session directories with on-demand stage subdirectories
//! - Traversal-safe artifact resolution for the API layer
//! - The persistent b-roll library and trained-LoRA registry
//! - GCS uploads and V4 signed URLs via IAM `signBlob`

pub mod error;
pub mod gcs;
pub mod library;
pub mod session;
pub mod token_cache;

pub use error::{StorageError, StorageResult};
pub use gcs::{content_type_for, GcsClient, GcsConfig};
pub use library::AssetLibrary;
pub use session::{stage, Session, SessionStore};
