//! Filesystem utilities for cross-device file operations.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERROR: i32 = 18;

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a fast rename first. When the source and destination live on
/// different filesystems the rename fails with EXDEV; the fallback copies
/// to a temp name next to `dst` and renames it into place so the
/// destination never holds a half-written file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, falling back to copy and delete"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE_ERROR)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Staging file sits in dst's directory so the final rename is atomic
    let staging = dst.with_extension("part");

    fs::copy(src, &staging).await?;

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(MediaError::from(e));
    }

    // Source removal is best-effort; the move itself already succeeded
    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Failed to remove source after move");
    }

    Ok(())
}
