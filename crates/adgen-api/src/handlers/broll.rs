//! B-roll library handlers.

use std::path::Path;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use adgen_models::{JobId, QueueJob};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{submit_job, JobAccepted};
use crate::metrics;
use crate::security::sanitize_file_name;
use crate::state::AppState;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

fn is_video_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// An entry in the b-roll library listing.
#[derive(Debug, Serialize)]
pub struct BrollVideo {
    pub file_name: String,
    pub size_bytes: u64,
    /// Workspace-relative path, servable through the artifact route.
    pub path: String,
}

/// `POST /api/broll/import` — multipart upload of b-roll videos.
///
/// Video files land in the library directly; zip archives are extracted
/// and any videos inside are moved in. Responds with the full listing.
pub async fn import_broll(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<BrollVideo>>)> {
    let broll_dir = state.library.ensure_broll_dir().await?;
    let mut imported = 0usize;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let file_name = match field.file_name() {
            Some(name) => sanitize_file_name(name, "upload.bin"),
            None => continue,
        };

        let is_zip = file_name.to_lowercase().ends_with(".zip");
        if !is_zip && !is_video_file(&file_name) {
            return Err(ApiError::validation(format!(
                "unsupported upload {file_name}: expected a video or a zip of videos"
            )));
        }

        // Spool the upload to a scratch directory, then move or extract.
        let scratch = tempfile::tempdir()
            .map_err(|e| ApiError::internal(format!("Failed to create scratch dir: {e}")))?;
        let spooled = scratch.path().join(&file_name);
        let mut file = tokio::fs::File::create(&spooled)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;
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
        drop(file);
        metrics::record_upload_received(written);

        if is_zip {
            let extracted = scratch.path().join("extracted");
            adgen_media::extract_zip(&spooled, &extracted).await?;
            imported += move_videos_into(&extracted, &broll_dir).await?;
        } else {
            adgen_media::move_file(&spooled, &broll_dir.join(&file_name)).await?;
            imported += 1;
        }
    }

    if imported == 0 {
        return Err(ApiError::validation("no video files in upload"));
    }

    info!(imported, "Imported b-roll videos");
    Ok((StatusCode::OK, Json(broll_listing(&state).await?)))
}

/// Move every video file under `src` (recursively) into `dest`.
async fn move_videos_into(src: &Path, dest: &Path) -> ApiResult<usize> {
    let mut moved = 0usize;
    let mut stack = vec![src.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to read extracted archive: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to read extracted archive: {e}")))?
        {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if is_video_file(&name) {
                let target = dest.join(sanitize_file_name(&name, "clip.mp4"));
                adgen_media::move_file(&path, &target).await?;
                moved += 1;
            } else {
                warn!(name, "Skipping non-video file in b-roll archive");
            }
        }
    }

    Ok(moved)
}

async fn broll_listing(state: &AppState) -> ApiResult<Vec<BrollVideo>> {
    let dir = state.library.broll_dir();
    let mut videos = Vec::new();

    if !tokio::fs::try_exists(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read b-roll library: {e}")))?
    {
        return Ok(videos);
    }

    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read b-roll library: {e}")))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read b-roll library: {e}")))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_video_file(&name) {
            continue;
        }
        let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
        videos.push(BrollVideo {
            path: format!("b_roll_videos/{name}"),
            file_name: name,
            size_bytes,
        });
    }

    videos.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(videos)
}

/// `GET /api/broll` — the b-roll library listing.
pub async fn list_broll(State(state): State<AppState>) -> ApiResult<Json<Vec<BrollVideo>>> {
    Ok(Json(broll_listing(&state).await?))
}

/// `POST /api/broll/describe` — cut the library and describe each cut.
pub async fn describe_broll(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let listing = broll_listing(&state).await?;
    if listing.is_empty() {
        return Err(ApiError::validation("b-roll library is empty"));
    }

    let session = state.sessions.create_session("broll").await?;
    let job = QueueJob::DescribeBroll {
        job_id: JobId::new(),
        session_id: session.id.to_string(),
    };
    submit_job(&state, job).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extension_detection() {
        assert!(is_video_file("clip.mp4"));
        assert!(is_video_file("CLIP.MOV"));
        assert!(!is_video_file("notes.txt"));
        assert!(!is_video_file("archive.zip"));
        assert!(!is_video_file("noext"));
    }
}
