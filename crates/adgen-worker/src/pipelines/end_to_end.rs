//! Headless product-to-commercial run: background, cutout, composite,
//! then a single animated clip.

use adgen_media::{fit_on_canvas, stitch_over_background, PORTRAIT_HEIGHT, PORTRAIT_WIDTH};
use adgen_models::{session_timestamp, SessionId};
use adgen_storage::stage;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

pub async fn run(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
    product_image: &str,
    background_prompt: &str,
    video_prompt: &str,
) -> WorkerResult<()> {
    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;
    let ts = session_timestamp();

    // The product source may be an uploaded file or a remote URL; the
    // background-removal provider accepts both.
    let is_remote = product_image.starts_with("http://") || product_image.starts_with("https://");
    let product_source = if is_remote {
        product_image.to_string()
    } else {
        let path = ctx.resolve_path(product_image);
        if !tokio::fs::try_exists(&path).await? {
            return Err(WorkerError::job_failed(format!(
                "Product image not found: {product_image}"
            )));
        }
        path.to_string_lossy().into_owned()
    };

    tracker.step(10, "Generating background").await;
    let backgrounds_dir = session.stage_dir(stage::BACKGROUNDS).await?;
    let background = backgrounds_dir.join(format!("background_{ts}.webp"));
    ctx.replicate
        .generate_flux_image(background_prompt, &background)
        .await?;
    tracker.artifact(&ctx.rel_artifact(&background)).await;

    tracker.step(30, "Cutting out the product").await;
    let processed_dir = session.stage_dir(stage::PROCESSED).await?;
    let cutout = processed_dir.join(format!("cutout_{ts}.png"));
    ctx.replicate.remove_background(&product_source, &cutout).await?;

    tracker.step(55, "Compositing product over background").await;
    let fitted = fit_on_canvas(&cutout, PORTRAIT_WIDTH, PORTRAIT_HEIGHT).await?;
    let overlaid_dir = session.stage_dir(stage::OVERLAID).await?;
    let composite = overlaid_dir.join(format!("overlaid_{ts}.png"));
    stitch_over_background(&background, &fitted, &composite).await?;
    tracker.artifact(&ctx.rel_artifact(&composite)).await;

    tracker.step(70, "Publishing composite").await;
    let composite_url = ctx.publish_image(&composite).await?;

    tracker.step(80, "Animating composite").await;
    let videos_dir = session.stage_dir(stage::VIDEOS).await?;
    let video = videos_dir.join(format!("generated_vid_{ts}.mp4"));
    ctx.luma.generate_video(video_prompt, &composite_url, &video).await?;
    tracker.artifact(&ctx.rel_artifact(&video)).await;

    tracker.log("Commercial clip generated").await;
    Ok(())
}
