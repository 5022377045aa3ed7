//! Redis-backed job infrastructure.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with idempotency dedup
//! - Worker consumption with retry accounting and a dead letter stream
//! - A job status store the API polls
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod progress;
pub mod queue;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use progress::ProgressChannel;
pub use queue::{JobQueue, QueueConfig};
pub use status::{StatusStore, JOB_RECORD_TTL_SECS};
