//! Image-to-video generation for product stills.

use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use rand::Rng;
use tracing::warn;

use adgen_models::{session_timestamp, SessionId, VideoEngine};
use adgen_storage::stage;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

/// At most this many stills become clips in one job.
const MAX_CLIPS: usize = 5;

const LUMA_PROMPT: &str = "Product commercial shoot with interesting and captivating product shots. The product is rotated and the camera does a zoom and pan to entice the viewer to buy the product.";

const RUNWAY_PROMPT: &str = "Create an epic commercial video for a product based on this image. Include dynamic camera movements, dramatic lighting, and a sense of grandeur to showcase the product's features and benefits.";

/// Animate product stills into short clips, several at a time.
///
/// Failed clips are logged and skipped; the job fails only when no clip
/// came out, surfacing the last provider error so retry classification
/// still sees the real cause.
pub async fn generate(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
    image_paths: &[String],
    prompt: Option<&str>,
    engine: VideoEngine,
) -> WorkerResult<()> {
    if image_paths.is_empty() {
        return Err(WorkerError::job_failed("No product images to animate"));
    }

    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;
    let videos_dir = session.stage_dir(stage::VIDEOS).await?;

    let images: Vec<PathBuf> = image_paths
        .iter()
        .take(MAX_CLIPS)
        .map(|p| ctx.resolve_path(p))
        .collect();
    if image_paths.len() > MAX_CLIPS {
        tracker
            .log(format!(
                "Using the first {MAX_CLIPS} of {} images",
                image_paths.len()
            ))
            .await;
    }

    let prompt = prompt.unwrap_or(match engine {
        VideoEngine::Luma => LUMA_PROMPT,
        VideoEngine::Runway => RUNWAY_PROMPT,
    });

    let total = images.len();
    tracker
        .step(10, &format!("Animating {total} stills with {engine}"))
        .await;

    let results: Vec<WorkerResult<PathBuf>> = stream::iter(images)
        .map(|image| {
            let videos_dir = &videos_dir;
            async move {
                let output = videos_dir.join(clip_file_name());
                match generate_one(ctx, engine, prompt, &image, &output).await {
                    Ok(()) => {
                        tracker.artifact(&ctx.rel_artifact(&output)).await;
                        Ok(output)
                    }
                    Err(e) => {
                        warn!(image = %image.display(), error = %e, "Clip generation failed");
                        tracker
                            .log(format!("Clip for {} failed: {e}", image.display()))
                            .await;
                        Err(e)
                    }
                }
            }
        })
        .buffer_unordered(ctx.config.video_parallel.max(1))
        .collect()
        .await;

    let mut clips = Vec::new();
    let mut last_error = None;
    for result in results {
        match result {
            Ok(path) => clips.push(path),
            Err(e) => last_error = Some(e),
        }
    }

    if clips.is_empty() {
        return Err(
            last_error.unwrap_or_else(|| WorkerError::job_failed("No clips were generated"))
        );
    }

    tracker
        .step(95, &format!("Generated {}/{total} clips", clips.len()))
        .await;
    Ok(())
}

async fn generate_one(
    ctx: &PipelineContext,
    engine: VideoEngine,
    prompt: &str,
    image: &Path,
    output: &Path,
) -> WorkerResult<()> {
    if !tokio::fs::try_exists(image).await? {
        return Err(WorkerError::job_failed(format!(
            "Source image not found: {}",
            image.display()
        )));
    }

    match engine {
        VideoEngine::Luma => {
            let image_url = ctx.publish_image(image).await?;
            ctx.luma.generate_video(prompt, &image_url, output).await?;
        }
        VideoEngine::Runway => {
            ctx.fal.generate_runway_video(prompt, image, output).await?;
        }
    }
    Ok(())
}

/// `output_video_<8 hex chars>_<timestamp>.mp4`, unique enough for
/// concurrent writes into the same stage directory.
fn clip_file_name() -> String {
    let tag: u32 = rand::rng().random();
    format!("output_video_{tag:08x}_{}.mp4", session_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_file_name_shape() {
        let name = clip_file_name();
        assert!(name.starts_with("output_video_"));
        assert!(name.ends_with(".mp4"));

        let parts: Vec<&str> = name.split('_').collect();
        // output, video, hash, date, time.mp4
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
