//! Clip normalization and final-video assembly.
//!
//! Generated clips arrive with heterogeneous dimensions, frame rates, and
//! audio layouts (Luma clips carry no audio at all). Everything is
//! normalized to a common format before concatenation, then the soundtrack
//! is muxed over the stitched result.

use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::fs_utils::move_file;
use crate::probe::probe_video;

/// File extensions treated as video clips.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Suffix of per-clip metadata files written by the description flow.
const METADATA_SUFFIX: &str = "_metadata.json";

/// Collect video files in a directory, sorted by file name.
pub async fn collect_videos(dir: impl AsRef<Path>) -> MediaResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut videos = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_video = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_video && entry.file_type().await?.is_file() {
            videos.push(path);
        }
    }

    videos.sort();
    Ok(videos)
}

/// Cut every `.mp4` in `src_dir` down to a uniformly random duration.
///
/// Each clip is trimmed from its start to a length in `[min_secs, max_secs]`
/// and re-encoded under `out_dir` with the same file name. Returns the cut
/// paths in name order.
pub async fn cut_broll(
    src_dir: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    min_secs: f64,
    max_secs: f64,
) -> MediaResult<Vec<PathBuf>> {
    let src_dir = src_dir.as_ref();
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).await?;

    let clips: Vec<PathBuf> = collect_videos(src_dir)
        .await?
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("mp4"))
                .unwrap_or(false)
        })
        .collect();

    let runner = FfmpegRunner::new();
    let mut cut = Vec::with_capacity(clips.len());

    for clip in clips {
        let length = rand::rng().random_range(min_secs..=max_secs);
        let dst = out_dir.join(clip.file_name().unwrap_or_default());

        let cmd = FfmpegCommand::new(&clip, &dst)
            .duration(length)
            .video_codec("libx264")
            .preset("veryfast")
            .crf(23)
            .audio_codec("aac");
        runner.run(&cmd).await?;

        debug!(clip = %clip.display(), secs = length, "Cut b-roll clip");
        cut.push(dst);
    }

    info!(count = cut.len(), dir = %out_dir.display(), "Cut b-roll clips");
    Ok(cut)
}

/// Scale a clip preserving aspect ratio, padding centered on black.
pub async fn resize_and_pad(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .video_filter(filters::scale_pad(width, height))
        .video_codec("libx264")
        .preset("veryfast")
        .crf(23)
        .audio_codec("copy");
    FfmpegRunner::new().run(&cmd).await
}

/// Re-encode a clip to a uniform format so it can be concatenated.
///
/// Clips without audio get a silent stereo track so the concat demuxer sees
/// the same stream layout in every part.
pub async fn normalize_clip(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    width: u32,
    height: u32,
    fps: f64,
) -> MediaResult<()> {
    let input = input.as_ref();
    let info = probe_video(input).await?;

    let mut cmd = FfmpegCommand::new(input, output.as_ref())
        .video_filter(filters::scale_pad_fps(width, height, fps))
        .video_codec("libx264")
        .preset("veryfast")
        .crf(23)
        .pixel_format("yuv420p")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .audio_rate(44100)
        .audio_channels(2);

    if !info.has_audio {
        cmd = cmd
            .push_input_with_args(
                ["-f", "lavfi"],
                "anullsrc=channel_layout=stereo:sample_rate=44100",
            )
            .map("0:v:0")
            .map("1:a:0")
            .shortest();
    }

    FfmpegRunner::new().run(&cmd).await
}

/// Concatenate normalized clips into a single video.
///
/// Uses the concat demuxer with a generated file list. A single clip
/// degenerates to a plain copy.
pub async fn concat_videos(clips: &[PathBuf], output: impl AsRef<Path>) -> MediaResult<()> {
    let output = output.as_ref();

    match clips {
        [] => Err(MediaError::internal("no clips to concatenate")),
        [only] => {
            fs::copy(only, output).await?;
            Ok(())
        }
        _ => {
            let work = tempfile::tempdir()?;
            let list_path = work.path().join("concat.txt");

            let mut list = String::new();
            for clip in clips {
                let abs = fs::canonicalize(clip).await?;
                list.push_str(&format!("file '{}'\n", escape_concat_path(&abs)));
            }
            fs::write(&list_path, list).await?;

            let cmd = FfmpegCommand::new(&list_path, output)
                .input_args(["-f", "concat", "-safe", "0"])
                .video_codec("libx264")
                .preset("veryfast")
                .crf(23)
                .audio_codec("aac")
                .audio_bitrate("192k");
            FfmpegRunner::new().run(&cmd).await
        }
    }
}

/// Escape a path for a concat-demuxer file list entry.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Mux an audio track over a video, trimming audio to `audio_secs`.
pub async fn combine_with_audio(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    audio_secs: f64,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(video.as_ref(), output.as_ref())
        .push_input_with_args(
            ["-t".to_string(), format!("{:.3}", audio_secs)],
            audio.as_ref().to_string_lossy().into_owned(),
        )
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .shortest();
    FfmpegRunner::new().run(&cmd).await
}

/// Assemble every clip in a directory into one commercial.
///
/// Clips are collected in name order (the ending video, if it lives in the
/// same directory, is excluded from the collection and appended last), all
/// normalized to the first clip's dimensions and frame rate, concatenated,
/// and finally muxed with the soundtrack trimmed to the stitched duration.
pub async fn assemble_commercial(
    video_dir: impl AsRef<Path>,
    ending_video: Option<&Path>,
    audio: Option<&Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let video_dir = video_dir.as_ref();
    let output = output.as_ref();

    let mut clips = collect_videos(video_dir).await?;
    if let Some(ending) = ending_video {
        clips.retain(|c| c.file_name() != ending.file_name());
    }
    if clips.is_empty() {
        return Err(MediaError::EmptyDirectory(video_dir.to_path_buf()));
    }

    let reference = probe_video(&clips[0]).await?;
    info!(
        clips = clips.len(),
        width = reference.width,
        height = reference.height,
        fps = reference.fps,
        "Assembling commercial"
    );

    let work = tempfile::tempdir()?;
    let mut normalized = Vec::with_capacity(clips.len() + 1);

    for (idx, clip) in clips.iter().enumerate() {
        let dst = work.path().join(format!("part_{idx:03}.mp4"));
        normalize_clip(clip, &dst, reference.width, reference.height, reference.fps).await?;
        normalized.push(dst);
    }

    if let Some(ending) = ending_video {
        if ending.exists() {
            let dst = work.path().join(format!("part_{:03}.mp4", normalized.len()));
            normalize_clip(ending, &dst, reference.width, reference.height, reference.fps).await?;
            normalized.push(dst);
        } else {
            warn!(path = %ending.display(), "Ending video missing, skipping");
        }
    }

    let stitched = work.path().join("stitched.mp4");
    concat_videos(&normalized, &stitched).await?;

    match audio {
        Some(track) if track.exists() => {
            let total = probe_video(&stitched).await?.duration;
            combine_with_audio(&stitched, track, output, total).await?;
        }
        Some(track) => {
            warn!(path = %track.display(), "Audio track missing, writing silent video");
            move_file(&stitched, output).await?;
        }
        None => {
            move_file(&stitched, output).await?;
        }
    }

    info!(output = %output.display(), "Commercial assembled");
    Ok(())
}

#[derive(Serialize)]
struct EnrichedMetadata<'a> {
    video_name: &'a str,
    video_duration_length: f64,
    #[serde(flatten)]
    rest: &'a serde_json::Map<String, serde_json::Value>,
}

/// Rewrite every `*_metadata.json` in a directory with the clip name and
/// probed duration, `video_name` ordered first.
///
/// Metadata files whose clip no longer exists are skipped with a warning.
/// Returns the number of files updated.
pub async fn enrich_metadata_durations(
    metadata_dir: impl AsRef<Path>,
    clips_dir: impl AsRef<Path>,
) -> MediaResult<usize> {
    let metadata_dir = metadata_dir.as_ref();
    let clips_dir = clips_dir.as_ref();
    let mut updated = 0;

    let mut entries = fs::read_dir(metadata_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(video_name) = name.strip_suffix(METADATA_SUFFIX) else {
            continue;
        };

        let clip_path = clips_dir.join(video_name);
        if !clip_path.exists() {
            warn!(clip = video_name, "No matching clip for metadata file, skipping");
            continue;
        }

        let duration = probe_video(&clip_path).await?.duration;
        let raw = fs::read_to_string(&path).await?;
        let mut rest: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;
        rest.remove("video_name");
        rest.remove("video_duration_length");

        let enriched = EnrichedMetadata {
            video_name,
            video_duration_length: duration,
            rest: &rest,
        };
        fs::write(&path, serde_json::to_string_pretty(&enriched)?).await?;
        updated += 1;
    }

    debug!(count = updated, "Enriched metadata files with durations");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_videos_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.mp4"), b"x").await.unwrap();
        fs::write(dir.path().join("a.MOV"), b"x").await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").await.unwrap();
        fs::write(dir.path().join("c.mkv"), b"x").await.unwrap();

        let videos = collect_videos(dir.path()).await.unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.MOV", "b.mp4", "c.mkv"]);
    }

    #[tokio::test]
    async fn test_concat_single_clip_copies() {
        let dir = TempDir::new().unwrap();
        let clip = dir.path().join("only.mp4");
        let output = dir.path().join("out.mp4");
        fs::write(&clip, b"fake video bytes").await.unwrap();

        concat_videos(&[clip], &output).await.unwrap();
        assert_eq!(fs::read(&output).await.unwrap(), b"fake video bytes");
    }

    #[tokio::test]
    async fn test_concat_empty_list_is_error() {
        let dir = TempDir::new().unwrap();
        let result = concat_videos(&[], dir.path().join("out.mp4")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_escape_concat_path() {
        let path = Path::new("/data/it's here.mp4");
        assert_eq!(escape_concat_path(path), "/data/it'\\''s here.mp4");
    }

    #[test]
    fn test_enriched_metadata_orders_video_name_first() {
        let mut rest = serde_json::Map::new();
        rest.insert(
            "video_description".to_string(),
            serde_json::Value::String("a product spin".to_string()),
        );

        let enriched = EnrichedMetadata {
            video_name: "clip.mp4",
            video_duration_length: 4.2,
            rest: &rest,
        };
        let json = serde_json::to_string(&enriched).unwrap();
        assert!(json.starts_with(r#"{"video_name":"clip.mp4""#));
        assert!(json.contains("video_duration_length"));
        assert!(json.contains("video_description"));
    }
}
