//! Backing-track generation handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use adgen_models::{JobId, QueueJob, SongQuota};

use crate::error::ApiResult;
use crate::handlers::{submit_job, JobAccepted};
use crate::security::validate_prompt;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateSongRequest {
    pub prompt: String,
    #[serde(default)]
    pub make_instrumental: bool,
}

/// `POST /api/songs/generate` — generate a backing track.
pub async fn generate_song(
    State(state): State<AppState>,
    Json(request): Json<GenerateSongRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let prompt = validate_prompt(&request.prompt, "prompt")?;

    let session = state.sessions.create_session("song").await?;
    let job = QueueJob::GenerateSong {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        prompt,
        make_instrumental: request.make_instrumental,
    };
    submit_job(&state, job).await
}

/// `GET /api/songs/quota` — remaining music-gateway credits.
pub async fn song_quota(State(state): State<AppState>) -> ApiResult<Json<SongQuota>> {
    Ok(Json(state.suno.quota().await?))
}
