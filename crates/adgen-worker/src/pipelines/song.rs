//! Backing-track generation through the song gateway.

use adgen_models::SessionId;
use adgen_storage::stage;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

/// Generate a song, wait for the clips to render, and download them into
/// the session's songs stage.
pub async fn generate(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
    prompt: &str,
    make_instrumental: bool,
) -> WorkerResult<()> {
    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;

    tracker.step(10, "Submitting song request").await;
    let clips = ctx.suno.generate(prompt, make_instrumental, false).await?;
    if clips.is_empty() {
        return Err(WorkerError::job_failed("Song service returned no clips"));
    }

    let ids: Vec<String> = clips.iter().map(|c| c.id.clone()).collect();
    tracker
        .step(30, &format!("Waiting for {} clips to render", ids.len()))
        .await;
    let ready = ctx.suno.wait_for_clips(&ids).await?;

    tracker.step(80, "Downloading songs").await;
    let songs_dir = session.stage_dir(stage::SONGS).await?;
    let files = ctx.suno.download_songs(&ready, &songs_dir).await?;
    if files.is_empty() {
        return Err(WorkerError::job_failed(
            "Rendered clips carried no downloadable audio",
        ));
    }

    for file in &files {
        tracker.artifact(&ctx.rel_artifact(file)).await;
    }
    tracker.log(format!("Downloaded {} songs", files.len())).await;
    Ok(())
}
