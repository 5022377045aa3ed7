//! Job status handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use adgen_models::JobRecord;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    #[serde(default = "default_jobs_limit")]
    pub limit: usize,
}

fn default_jobs_limit() -> usize {
    50
}

/// `GET /api/jobs` — recent job records, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    Ok(Json(state.status.list_recent(query.limit.min(200)).await?))
}

/// `GET /api/jobs/{id}` — one job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    state
        .status
        .get_record(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id}")))
}
