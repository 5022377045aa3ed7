//! Request handlers.

pub mod artifacts;
pub mod broll;
pub mod commercials;
pub mod health;
pub mod images;
pub mod jobs;
pub mod loras;
pub mod songs;
pub mod styles;
pub mod videos;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use adgen_models::QueueJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response body for accepted job submissions.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub session_id: String,
}

/// Enqueue a job, mapping idempotency rejection to 409.
pub(crate) async fn submit_job(
    state: &AppState,
    job: QueueJob,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let kind = job.kind();
    match state.queue.enqueue(&job).await? {
        Some(_) => {
            metrics::record_job_enqueued(kind.as_str());
            Ok((
                StatusCode::ACCEPTED,
                Json(JobAccepted {
                    job_id: job.job_id().to_string(),
                    session_id: job.session_id().to_string(),
                }),
            ))
        }
        None => {
            metrics::record_job_rejected(kind.as_str());
            Err(ApiError::conflict(
                "An identical job is already queued or running",
            ))
        }
    }
}
