//! B-roll cutting and description.

use adgen_media::{collect_videos, cut_broll};
use adgen_models::SessionId;
use adgen_storage::stage;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

/// Snippet lengths for cut b-roll, in seconds.
const CUT_MIN_SECS: f64 = 2.0;
const CUT_MAX_SECS: f64 = 5.0;

/// Cut the shared b-roll library into short snippets and describe each one
/// with the vision model, writing a metadata JSON per snippet.
///
/// Snippets the model cannot describe are skipped inside the describer;
/// the job fails only when nothing was described.
pub async fn describe(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
) -> WorkerResult<()> {
    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;

    let broll_dir = ctx.library.ensure_broll_dir().await?;
    let source_clips = collect_videos(&broll_dir).await?;
    if source_clips.is_empty() {
        return Err(WorkerError::job_failed(
            "The b-roll library is empty. Import videos before describing.",
        ));
    }

    tracker
        .step(10, &format!("Cutting {} b-roll videos", source_clips.len()))
        .await;
    let cut_dir = session.stage_dir(stage::BROLL_CUT).await?;
    let cuts = cut_broll(&broll_dir, &cut_dir, CUT_MIN_SECS, CUT_MAX_SECS).await?;
    if cuts.is_empty() {
        return Err(WorkerError::job_failed(
            "No mp4 videos in the b-roll library to cut",
        ));
    }

    tracker
        .step(40, &format!("Describing {} snippets", cuts.len()))
        .await;
    let described = ctx
        .gemini
        .describe_directory(&cut_dir, ctx.config.describe_parallel)
        .await?;
    if described.is_empty() {
        return Err(WorkerError::job_failed("No b-roll snippets could be described"));
    }

    tracker.step(80, "Writing metadata").await;
    let meta_dir = session.stage_dir(stage::BROLL_METADATA).await?;
    for (video, metadata) in &described {
        let path = ctx.gemini.save_metadata(metadata, video, &meta_dir).await?;
        tracker.artifact(&ctx.rel_artifact(&path)).await;
    }

    tracker
        .log(format!("Described {}/{} snippets", described.len(), cuts.len()))
        .await;
    Ok(())
}
