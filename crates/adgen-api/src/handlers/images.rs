//! Styled product-still generation handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use adgen_models::{JobId, QueueJob};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{submit_job, JobAccepted};
use crate::security::{
    validate_https_url, validate_prompt, validate_trigger_word, MAX_PROMPTS_PER_JOB,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateImagesRequest {
    pub lora_url: String,
    pub trigger_word: String,
    /// Prompts to render, one image each. Empty means the worker's
    /// default styled set.
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// `POST /api/images/generate` — render product stills through a trained LoRA.
pub async fn generate_images(
    State(state): State<AppState>,
    Json(request): Json<GenerateImagesRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    validate_https_url(&request.lora_url, "lora_url")?;
    validate_trigger_word(&request.trigger_word)?;
    if request.prompts.len() > MAX_PROMPTS_PER_JOB {
        return Err(ApiError::validation(format!(
            "at most {MAX_PROMPTS_PER_JOB} prompts per job"
        )));
    }
    let prompts = request
        .prompts
        .iter()
        .map(|p| validate_prompt(p, "prompt"))
        .collect::<ApiResult<Vec<String>>>()?;

    let session = state.sessions.create_session("images").await?;
    let job = QueueJob::GenerateLoraImages {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
        lora_url: request.lora_url,
        trigger_word: request.trigger_word,
        prompts,
    };
    submit_job(&state, job).await
}
