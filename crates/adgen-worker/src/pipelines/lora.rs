//! LoRA fine-tuning and styled still generation.

use tracing::warn;

use adgen_models::{session_timestamp, LoraModel, SessionId};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

/// Styled shot templates used when a submission carries no prompts.
/// `{trigger}` is replaced with the model's trigger word.
const DEFAULT_STYLE_TEMPLATES: [&str; 5] = [
    "Professional studio photo of {trigger} on a marble countertop, softbox lighting, shallow depth of field",
    "{trigger} floating over a vibrant color gradient backdrop, bold commercial product shot",
    "Person holding {trigger} at golden hour, candid lifestyle photo, warm tones",
    "Extreme macro shot of {trigger} with dramatic rim lighting on a black background",
    "{trigger} on a beach at sunset, cinematic wide shot with gentle waves behind",
];

/// Train a LoRA from an uploaded image archive and register it in the
/// asset library.
pub async fn train(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    _session_id: &str,
    archive_path: &str,
    trigger_word: &str,
    steps: u32,
) -> WorkerResult<()> {
    let archive = ctx.resolve_path(archive_path);
    if !tokio::fs::try_exists(&archive).await? {
        return Err(WorkerError::job_failed(format!(
            "Training archive not found: {archive_path}"
        )));
    }

    tracker
        .step(10, &format!("Training LoRA \"{trigger_word}\" ({steps} steps)"))
        .await;
    let lora_url = ctx.fal.train_lora(&archive, trigger_word, steps).await?;

    tracker.step(90, "Registering trained model").await;
    let model = LoraModel::new(trigger_word, lora_url);
    let entry = ctx.library.save_lora(&model).await?;
    tracker.artifact(&ctx.rel_artifact(&entry)).await;
    tracker.log(format!("LoRA \"{trigger_word}\" is ready")).await;
    Ok(())
}

/// Generate product stills with a trained LoRA, one image per prompt.
///
/// Individual prompt failures are logged and skipped; the job fails only
/// when nothing was produced at all.
pub async fn generate_images(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
    lora_url: &str,
    trigger_word: &str,
    prompts: &[String],
) -> WorkerResult<()> {
    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;

    let prompts: Vec<String> = if prompts.is_empty() {
        default_style_prompts(trigger_word)
    } else {
        prompts.to_vec()
    };

    let out_dir = session.path(format!("lora_generated_images_{}", session_timestamp()));
    tokio::fs::create_dir_all(&out_dir).await?;

    let total = prompts.len();
    let mut generated = 0usize;
    let mut last_error = None;

    for (i, prompt) in prompts.iter().enumerate() {
        tracker
            .step(image_progress(i, total), &format!("Generating image {}/{total}", i + 1))
            .await;

        let output = out_dir.join(format!("lora_generated_image_{}.jpg", i + 1));
        match ctx.fal.generate_lora_image(prompt, lora_url, &output).await {
            Ok(()) => {
                generated += 1;
                tracker.artifact(&ctx.rel_artifact(&output)).await;
            }
            Err(e) => {
                warn!(prompt = %prompt, error = %e, "Image generation failed, continuing");
                tracker
                    .log(format!("Image {}/{total} failed: {e}", i + 1))
                    .await;
                last_error = Some(e);
            }
        }
    }

    if generated == 0 {
        if let Some(e) = last_error {
            return Err(e.into());
        }
        return Err(WorkerError::job_failed("No images were generated"));
    }

    tracker.log(format!("Generated {generated}/{total} images")).await;
    Ok(())
}

fn default_style_prompts(trigger_word: &str) -> Vec<String> {
    DEFAULT_STYLE_TEMPLATES
        .iter()
        .map(|t| t.replace("{trigger}", trigger_word))
        .collect()
}

/// Spread per-image progress over the 5..=95 range.
fn image_progress(index: usize, total: usize) -> u8 {
    (5 + index * 90 / total.max(1)) as u8
}
