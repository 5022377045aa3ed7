//! Commercial assembly handlers: compose from existing artifacts, or run
//! the whole pipeline headless from a single product photo.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

use adgen_models::{JobId, QueueJob, SessionId, StylePreset};
use adgen_storage::stage;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{submit_job, JobAccepted};
use crate::metrics;
use crate::security::{
    sanitize_file_name, validate_https_url, validate_prompt, validate_workspace_path,
};
use crate::state::AppState;

/// Default animation prompt when the caller supplies neither a prompt
/// nor a style.
const DEFAULT_VIDEO_PROMPT: &str = "Product commercial shoot with interesting and captivating \
     product shots. The product is rotated and the camera does a zoom and pan to entice the \
     viewer to buy the product.";

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    /// Session whose `videos/` directory supplies the clips; defaults to
    /// the newest session that has one.
    pub video_session: Option<String>,
    /// Workspace-relative path of the backing track.
    pub audio_path: String,
    pub product_description: String,
    #[serde(default)]
    pub use_broll: bool,
}

/// `POST /api/commercials/compose` — sequence existing clips and a
/// backing track into the final commercial.
pub async fn compose_commercial(
    State(state): State<AppState>,
    Json(request): Json<ComposeRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let product_description = validate_prompt(&request.product_description, "product_description")?;
    validate_workspace_path(&request.audio_path, "audio_path")?;
    // Fail fast on a missing track instead of letting the worker discover it.
    state.sessions.resolve_artifact(&request.audio_path).await?;

    let video_session = match request.video_session {
        Some(raw) => {
            let id = SessionId::from_string(raw);
            state.sessions.open_session(&id).await?;
            id.to_string()
        }
        None => newest_video_session(&state).await?,
    };
    let video_dir = format!("{video_session}/{}", stage::VIDEOS);
    state.sessions.resolve_artifact(&video_dir).await?;

    let session = state.sessions.create_session("commercial").await?;
    let job = QueueJob::ComposeCommercial {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        video_dir,
        audio_path: request.audio_path,
        product_description,
        use_broll: request.use_broll,
    };
    submit_job(&state, job).await
}

/// The newest session that has a `videos/` stage directory.
async fn newest_video_session(state: &AppState) -> ApiResult<String> {
    for session_id in state.sessions.list_sessions().await? {
        let candidate = state
            .sessions
            .root()
            .join(&session_id)
            .join(stage::VIDEOS);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            info!(session_id, "Defaulting compose to newest video session");
            return Ok(session_id);
        }
    }
    Err(ApiError::validation(
        "no session with generated videos found; pass video_session explicitly",
    ))
}

/// `POST /api/commercials/pipeline` — headless end-to-end run from one
/// product photo.
///
/// Multipart fields: `product_image` (file) or `image_url`, plus either
/// `background_prompt` or a `style` preset, and an optional
/// `video_prompt`.
pub async fn run_pipeline(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let session = state.sessions.create_session("pipeline").await?;

    let mut product_image = None;
    let mut background_prompt = None;
    let mut style = None;
    let mut video_prompt = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "product_image" => {
                let file_name =
                    sanitize_file_name(field.file_name().unwrap_or_default(), "product.png");
                let path = session.path(&file_name);
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;
                let mut written = 0u64;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {e}")))?
                {
                    written += chunk.len() as u64;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;
                metrics::record_upload_received(written);
                product_image = Some(format!("{}/{}", session.id, file_name));
            }
            "image_url" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                validate_https_url(&value, "image_url")?;
                product_image = Some(value);
            }
            "background_prompt" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                background_prompt = Some(validate_prompt(&value, "background_prompt")?);
            }
            "style" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                style = Some(
                    value
                        .parse::<StylePreset>()
                        .map_err(|e| ApiError::validation(e.to_string()))?,
                );
            }
            "video_prompt" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                video_prompt = Some(validate_prompt(&value, "video_prompt")?);
            }
            _ => {}
        }
    }

    let product_image =
        product_image.ok_or_else(|| ApiError::validation("missing product_image or image_url"))?;
    let background_prompt = match (background_prompt, style) {
        (Some(prompt), _) => prompt,
        (None, Some(preset)) => preset.prompt().to_string(),
        (None, None) => {
            return Err(ApiError::validation(
                "missing background_prompt or style field",
            ))
        }
    };

    let job = QueueJob::RunPipeline {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        product_image,
        background_prompt,
        video_prompt: video_prompt.unwrap_or_else(|| DEFAULT_VIDEO_PROMPT.to_string()),
    };
    submit_job(&state, job).await
}
