//! LoRA training and registry handlers.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tokio::io::AsyncWriteExt;
use tracing::info;

use adgen_models::{JobId, LoraModel, QueueJob};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{submit_job, JobAccepted};
use crate::metrics;
use crate::security::{sanitize_file_name, validate_trigger_word};
use crate::state::AppState;

const DEFAULT_TRAINING_STEPS: u32 = 1000;
const MAX_TRAINING_STEPS: u32 = 10_000;

/// `POST /api/loras/train` — multipart upload of a training-image zip.
///
/// Fields: `archive` (the zip), `trigger_word`, optional `steps`.
pub async fn train_lora(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let session = state.sessions.create_session("train").await?;

    let mut archive_path = None;
    let mut trigger_word = None;
    let mut steps = DEFAULT_TRAINING_STEPS;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "archive" => {
                let file_name = sanitize_file_name(
                    field.file_name().unwrap_or_default(),
                    "training_images.zip",
                );
                if !file_name.to_lowercase().ends_with(".zip") {
                    return Err(ApiError::validation("archive must be a .zip file"));
                }

                let path = session.path(&file_name);
                let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
                    ApiError::internal(format!("Failed to store upload: {e}"))
                })?;
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
                info!(path = %path.display(), bytes = written, "Stored training archive");
                archive_path = Some(format!("{}/{}", session.id, file_name));
            }
            "trigger_word" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                validate_trigger_word(&value)?;
                trigger_word = Some(value);
            }
            "steps" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                steps = value
                    .parse()
                    .map_err(|_| ApiError::validation("steps must be a positive integer"))?;
                if steps == 0 || steps > MAX_TRAINING_STEPS {
                    return Err(ApiError::validation(format!(
                        "steps must be between 1 and {MAX_TRAINING_STEPS}"
                    )));
                }
            }
            _ => {}
        }
    }

    let archive_path =
        archive_path.ok_or_else(|| ApiError::validation("missing archive upload"))?;
    let trigger_word =
        trigger_word.ok_or_else(|| ApiError::validation("missing trigger_word field"))?;

    let job = QueueJob::TrainLora {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        archive_path,
        trigger_word,
        steps,
    };
    submit_job(&state, job).await
}

/// `GET /api/loras` — trained model registry.
pub async fn list_loras(State(state): State<AppState>) -> ApiResult<Json<Vec<LoraModel>>> {
    Ok(Json(state.library.list_loras().await?))
}
