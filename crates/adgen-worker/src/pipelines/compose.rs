//! Final commercial assembly.
//!
//! Without b-roll the product clips are stitched in directory order.
//! With b-roll a sequencing model picks an order that interleaves the
//! session's described snippets between the product clips; if its reply
//! is unusable the product clips are stitched alone. Every sequenced
//! clip is normalized to the portrait canvas before concatenation and
//! the backing track is trimmed to the stitched length.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use adgen_llm::{CallOptions, ChatMessage, Service};
use adgen_media::{
    assemble_commercial, collect_videos, combine_with_audio, concat_videos,
    enrich_metadata_durations, get_duration, resize_and_pad, PORTRAIT_HEIGHT, PORTRAIT_WIDTH,
};
use adgen_models::SessionId;
use adgen_storage::{stage, Session};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tracker::JobTracker;

const SEQUENCING_MODEL: &str = "claude-3-5-sonnet-20240620";
const SEQUENCING_MAX_TOKENS: u32 = 1000;

/// Bounds for the random cap on the sequenced clip count.
const MIN_SEQUENCE_LEN: usize = 8;
const MAX_SEQUENCE_LEN: usize = 12;

const SEQUENCE_FORMAT_EXAMPLE: &str = r#"
{
    "video_sequence":
    [
        "/absolute/path/to/video1.mp4",
        "/absolute/path/to/video2.mp4",
        "/absolute/path/to/video3.mp4"
    ]
}
"#;

pub async fn compose(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session_id: &str,
    video_dir: &str,
    audio_path: &str,
    product_description: &str,
    use_broll: bool,
) -> WorkerResult<()> {
    let session = ctx
        .sessions
        .ensure_session(&SessionId::from_string(session_id))
        .await?;

    let video_dir = canonical_input(&ctx.resolve_path(video_dir), "Product clip directory").await?;
    let audio_path = canonical_input(&ctx.resolve_path(audio_path), "Backing track").await?;

    let product_clips = collect_videos(&video_dir).await?;
    if product_clips.is_empty() {
        return Err(WorkerError::job_failed(format!(
            "No product clips found in {}",
            video_dir.display()
        )));
    }

    let final_dir = session.stage_dir(stage::FINAL).await?;
    let final_path = ctx
        .sessions
        .unique_path(&final_dir, "final_stitched_video", "mp4")
        .await?;

    if use_broll {
        compose_sequenced(
            ctx,
            tracker,
            &session,
            &product_clips,
            &audio_path,
            product_description,
            &final_path,
        )
        .await?;
    } else {
        tracker
            .step(40, &format!("Stitching {} product clips", product_clips.len()))
            .await;
        assemble_commercial(&video_dir, None, Some(&audio_path), &final_path).await?;
    }

    tracker.artifact(&ctx.rel_artifact(&final_path)).await;
    tracker.log("Commercial assembled").await;
    Ok(())
}

/// The b-roll path: ask the sequencing model for a clip order, cap it,
/// normalize every part to portrait, concatenate, and mux the audio.
async fn compose_sequenced(
    ctx: &PipelineContext,
    tracker: &JobTracker,
    session: &Session,
    product_clips: &[PathBuf],
    audio_path: &Path,
    product_description: &str,
    final_path: &Path,
) -> WorkerResult<()> {
    tracker
        .step(20, &format!("Sequencing {} product clips with b-roll", product_clips.len()))
        .await;

    let mut sequence =
        match broll_sequence(ctx, session, product_clips, audio_path, product_description).await {
            Ok(sequence) if !sequence.is_empty() => sequence,
            Ok(_) => {
                tracker
                    .log("Sequencer returned no usable clips, stitching product clips only")
                    .await;
                product_clips.to_vec()
            }
            Err(e) => {
                warn!(error = %e, "B-roll sequencing failed, stitching product clips only");
                tracker
                    .log(format!("B-roll sequencing failed ({e}), stitching product clips only"))
                    .await;
                product_clips.to_vec()
            }
        };

    let cap = rand::rng().random_range(MIN_SEQUENCE_LEN..=MAX_SEQUENCE_LEN);
    if sequence.len() > cap {
        tracker.log(format!("Capping sequence at {cap} clips")).await;
        sequence.truncate(cap);
    }

    tracker
        .step(50, &format!("Normalizing {} clips to portrait", sequence.len()))
        .await;
    let parts_dir = session.stage_dir("compose_parts").await?;
    let mut parts = Vec::with_capacity(sequence.len());
    for (idx, clip) in sequence.iter().enumerate() {
        let part = parts_dir.join(format!("part_{idx:03}.mp4"));
        resize_and_pad(clip, &part, PORTRAIT_WIDTH, PORTRAIT_HEIGHT).await?;
        parts.push(part);
    }

    tracker.step(75, "Concatenating clips").await;
    let stitched = parts_dir.join("stitched.mp4");
    concat_videos(&parts, &stitched).await?;

    tracker.step(90, "Muxing backing track").await;
    let stitched_secs = get_duration(&stitched).await?;
    combine_with_audio(&stitched, audio_path, final_path, stitched_secs).await?;
    Ok(())
}

/// Ask the sequencing model for a clip order over the session's described
/// b-roll. Returns only clips that exist on disk.
async fn broll_sequence(
    ctx: &PipelineContext,
    session: &Session,
    product_clips: &[PathBuf],
    audio_path: &Path,
    product_description: &str,
) -> WorkerResult<Vec<PathBuf>> {
    let cut_dir = session.path(stage::BROLL_CUT);
    if !tokio::fs::try_exists(&cut_dir).await? {
        return Err(WorkerError::job_failed(
            "No described b-roll in this session. Run b-roll description first.",
        ));
    }
    let cut_dir = tokio::fs::canonicalize(&cut_dir).await?;

    let broll_clips = collect_videos(&cut_dir).await?;
    if broll_clips.is_empty() {
        return Err(WorkerError::job_failed(
            "No described b-roll in this session. Run b-roll description first.",
        ));
    }

    let meta_dir = session.path(stage::BROLL_METADATA);
    let metadata = if tokio::fs::try_exists(&meta_dir).await? {
        // Imported metadata may predate duration probing.
        let updated = enrich_metadata_durations(&meta_dir, &cut_dir).await?;
        debug!(updated, "Enriched b-roll metadata durations");
        load_metadata(&meta_dir).await?
    } else {
        Vec::new()
    };

    let prompt = build_sequencing_prompt(
        product_clips,
        &broll_clips,
        &metadata,
        audio_path,
        product_description,
    );
    let opts = CallOptions::new(Service::Claude)
        .model(SEQUENCING_MODEL)
        .max_tokens(SEQUENCING_MAX_TOKENS);
    let reply = ctx.llm.call_json(&[ChatMessage::user(prompt)], &opts).await?;

    let mut existing = Vec::new();
    for path in extract_sequence(&reply) {
        if tokio::fs::try_exists(&path).await? {
            existing.push(path);
        } else {
            warn!(path = %path.display(), "Sequencer referenced a missing clip, skipping");
        }
    }
    Ok(existing)
}

/// Load every `*_metadata.json` beside the cut snippets, in name order.
async fn load_metadata(meta_dir: &Path) -> WorkerResult<Vec<(PathBuf, String)>> {
    let meta_dir = tokio::fs::canonicalize(meta_dir).await?;
    let mut files = Vec::new();

    let mut entries = tokio::fs::read_dir(&meta_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_metadata = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_metadata.json"));
        if is_metadata {
            let content = tokio::fs::read_to_string(&path).await?;
            files.push((path, content));
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Build the sequencing request listing every clip by absolute path.
fn build_sequencing_prompt(
    product_clips: &[PathBuf],
    broll_clips: &[PathBuf],
    metadata: &[(PathBuf, String)],
    audio_path: &Path,
    product_description: &str,
) -> String {
    let mut prompt = String::from(
        "Create a video output script for a product commercial. Use the following information:\n\n",
    );

    prompt.push_str("Product shoot videos:\n");
    for (i, clip) in product_clips.iter().enumerate() {
        prompt.push_str(&format!("- Video {}: {}\n", i + 1, clip.display()));
    }

    prompt.push_str("\nB-roll videos:\n");
    for clip in broll_clips {
        prompt.push_str(&format!("- {}\n", clip.display()));
    }

    prompt.push_str("\nB-roll videos and metadata:\n");
    for (path, content) in metadata {
        prompt.push_str(&format!("- {}:\n  Video metadata: {content}\n\n", path.display()));
    }

    prompt.push_str("\nAudio file:\n");
    prompt.push_str(&format!("- {}\n", audio_path.display()));

    prompt.push_str(&format!("\nProduct Description:\n{product_description}\n"));

    prompt.push_str(
        "\nCreate a script that alternates between product shoot videos and b-roll videos.\n\
         Specify which videos to use and in what order.\n\
         The final output should be a list of video filenames to be stitched together with the audio.\n\
         Include a maximum of 5 b-roll videos in the sequence.\n\
         Use the exact filenames provided with their absolute paths.\n\
         Make sure the b-roll aesthetics inserted in the list are of similar style to the product shoot videos and align with the product description.\n\
         Ensure the sequence tells a cohesive story about the product.\n",
    );
    prompt.push_str(&format!(
        "Ensure that the output is a json response with the format {SEQUENCE_FORMAT_EXAMPLE}"
    ));
    prompt.push_str("Start the output with {");
    prompt
}

/// Pull the `video_sequence` list out of the model's reply.
fn extract_sequence(reply: &Value) -> Vec<PathBuf> {
    reply
        .get("video_sequence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

async fn canonical_input(path: &Path, what: &str) -> WorkerResult<PathBuf> {
    if !tokio::fs::try_exists(path).await? {
        return Err(WorkerError::job_failed(format!(
            "{what} not found: {}",
            path.display()
        )));
    }
    Ok(tokio::fs::canonicalize(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequencing_prompt_lists_all_inputs() {
        let products = vec![PathBuf::from("/data/s/videos/a.mp4"), PathBuf::from("/data/s/videos/b.mp4")];
        let broll = vec![PathBuf::from("/data/s/broll_cut/c.mp4")];
        let metadata = vec![(
            PathBuf::from("/data/s/broll_metadata/c.mp4_metadata.json"),
            r#"{"description":"waves"}"#.to_string(),
        )];

        let prompt = build_sequencing_prompt(
            &products,
            &broll,
            &metadata,
            Path::new("/data/s/songs/track.mp3"),
            "A solar lantern",
        );

        assert!(prompt.contains("- Video 1: /data/s/videos/a.mp4"));
        assert!(prompt.contains("- Video 2: /data/s/videos/b.mp4"));
        assert!(prompt.contains("- /data/s/broll_cut/c.mp4"));
        assert!(prompt.contains(r#"Video metadata: {"description":"waves"}"#));
        assert!(prompt.contains("- /data/s/songs/track.mp3"));
        assert!(prompt.contains("Product Description:\nA solar lantern"));
        assert!(prompt.contains("maximum of 5 b-roll videos"));
        assert!(prompt.contains("\"video_sequence\""));
        assert!(prompt.ends_with("Start the output with {"));
    }

    #[test]
    fn test_extract_sequence_reads_string_entries() {
        let reply = json!({
            "video_sequence": ["/a.mp4", "/b.mp4", 42, "/c.mp4"]
        });
        let sequence = extract_sequence(&reply);
        assert_eq!(
            sequence,
            vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4"), PathBuf::from("/c.mp4")]
        );
    }

    #[test]
    fn test_extract_sequence_tolerates_missing_key() {
        assert!(extract_sequence(&json!({"clips": []})).is_empty());
        assert!(extract_sequence(&json!("not an object")).is_empty());
    }

    #[test]
    fn test_sequence_cap_bounds() {
        for _ in 0..50 {
            let cap = rand::rng().random_range(MIN_SEQUENCE_LEN..=MAX_SEQUENCE_LEN);
            assert!((MIN_SEQUENCE_LEN..=MAX_SEQUENCE_LEN).contains(&cap));
        }
    }

    #[tokio::test]
    async fn test_load_metadata_reads_only_metadata_files() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("b.mp4_metadata.json"), r#"{"description":"b"}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("a.mp4_metadata.json"), r#"{"description":"a"}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignore").await.unwrap();

        let files = load_metadata(dir.path()).await.unwrap();
        assert_eq!(files.len(), 2);
        let first = files[0].0.file_name().unwrap().to_str().unwrap();
        assert_eq!(first, "a.mp4_metadata.json");
        assert_eq!(files[0].1, r#"{"description":"a"}"#);
    }

    #[tokio::test]
    async fn test_canonical_input_rejects_missing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.mp3");
        let err = canonical_input(&missing, "Backing track").await.unwrap_err();
        assert!(err.to_string().contains("Backing track not found"));
    }
}
