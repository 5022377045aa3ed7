//! Pipeline implementations, one per job kind.
//!
//! Each pipeline takes the shared [`PipelineContext`] for provider and
//! storage access and a [`JobTracker`] for status, progress frames, and
//! artifact registration. Pipelines return `Err` only for failures that
//! should go through the retry / dead-letter machinery; recoverable
//! per-item failures (one bad image out of five) are logged and skipped.

mod broll;
mod compose;
mod end_to_end;
mod lora;
mod song;
mod videos;

use adgen_models::QueueJob;

use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::tracker::JobTracker;

/// Run the pipeline matching the job's kind.
pub async fn execute(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    job: &QueueJob,
) -> WorkerResult<()> {
    match job {
        QueueJob::TrainLora {
            session_id,
            archive_path,
            trigger_word,
            steps,
            ..
        } => lora::train(ctx, tracker, session_id, archive_path, trigger_word, *steps).await,
        QueueJob::GenerateLoraImages {
            session_id,
            lora_url,
            trigger_word,
            prompts,
            ..
        } => lora::generate_images(ctx, tracker, session_id, lora_url, trigger_word, prompts).await,
        QueueJob::GenerateProductVideos {
            session_id,
            image_paths,
            prompt,
            engine,
            ..
        } => {
            videos::generate(ctx, tracker, session_id, image_paths, prompt.as_deref(), *engine)
                .await
        }
        QueueJob::GenerateSong {
            session_id,
            prompt,
            make_instrumental,
            ..
        } => song::generate(ctx, tracker, session_id, prompt, *make_instrumental).await,
        QueueJob::DescribeBroll { session_id, .. } => broll::describe(ctx, tracker, session_id).await,
        QueueJob::ComposeCommercial {
            session_id,
            video_dir,
            audio_path,
            product_description,
            use_broll,
            ..
        } => {
            compose::compose(
                ctx,
                tracker,
                session_id,
                video_dir,
                audio_path,
                product_description,
                *use_broll,
            )
            .await
        }
        QueueJob::RunPipeline {
            session_id,
            product_image,
            background_prompt,
            video_prompt,
            ..
        } => {
            end_to_end::run(ctx, tracker, session_id, product_image, background_prompt, video_prompt)
                .await
        }
    }
}
