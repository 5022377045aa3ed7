//! Product video generation handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use adgen_models::{JobId, QueueJob, VideoEngine};
use adgen_providers::CompletedGeneration;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{submit_job, JobAccepted};
use crate::security::{validate_prompt, validate_workspace_path, MAX_IMAGES_PER_JOB};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateVideosRequest {
    /// Workspace-relative paths of the source stills.
    pub image_paths: Vec<String>,
    /// Shared generation prompt; absent means the engine default.
    pub prompt: Option<String>,
    /// "luma" (default) or "runway".
    pub engine: Option<String>,
}

/// `POST /api/videos/generate` — animate product stills into clips.
pub async fn generate_videos(
    State(state): State<AppState>,
    Json(request): Json<GenerateVideosRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    if request.image_paths.is_empty() {
        return Err(ApiError::validation("image_paths must not be empty"));
    }
    if request.image_paths.len() > MAX_IMAGES_PER_JOB {
        return Err(ApiError::validation(format!(
            "at most {MAX_IMAGES_PER_JOB} images per job"
        )));
    }
    for path in &request.image_paths {
        validate_workspace_path(path, "image_paths")?;
    }
    let prompt = request
        .prompt
        .as_deref()
        .map(|p| validate_prompt(p, "prompt"))
        .transpose()?;

    let engine = match &request.engine {
        Some(raw) => raw
            .parse::<VideoEngine>()
            .map_err(|e| ApiError::validation(e.to_string()))?,
        None => VideoEngine::default(),
    };

    let session = state.sessions.create_session("videos").await?;
    let job = QueueJob::GenerateProductVideos {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        image_paths: request.image_paths,
        prompt,
        engine,
    };
    submit_job(&state, job).await
}

#[derive(Debug, Deserialize)]
pub struct GenerationsQuery {
    #[serde(default = "default_generations_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_generations_limit() -> u32 {
    20
}

/// `GET /api/generations` — completed remote generations that still have a
/// downloadable video.
pub async fn list_generations(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<GenerationsQuery>,
) -> ApiResult<Json<Vec<CompletedGeneration>>> {
    let luma = state
        .luma
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Video engine credentials not configured"))?;
    Ok(Json(
        luma.list_generations(query.limit.min(100), query.offset)
            .await?,
    ))
}
