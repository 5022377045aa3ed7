//! Commercial generation worker.
//!
//! This crate provides:
//! - Job executor with a consumer-group claim loop and graceful shutdown
//! - One pipeline per job kind (LoRA training and stills, product clips,
//!   songs, b-roll description, composition, end-to-end runs)
//! - Status, progress, and artifact tracking per job
//! - Retry classification and dead-lettering

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pipelines;
pub mod retry;
pub mod tracker;

pub use config::WorkerConfig;
pub use context::PipelineContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use tracker::JobTracker;
