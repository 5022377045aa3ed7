//! Zip import/export for uploaded assets.
//!
//! B-roll libraries and LoRA training sets arrive as zip uploads; training
//! sets also leave as a zip handed to the training service.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{MediaError, MediaResult};

/// Extract a zip archive into `dest`.
///
/// Entry names that would escape `dest` (absolute paths, `..` components)
/// are skipped. Returns the number of files extracted.
pub async fn extract_zip(archive: impl AsRef<Path>, dest: impl AsRef<Path>) -> MediaResult<usize> {
    let archive = archive.as_ref().to_path_buf();
    let dest = dest.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_sync(&archive, &dest))
        .await
        .map_err(|e| MediaError::internal(format!("archive task panicked: {e}")))?
}

fn extract_zip_sync(archive: &Path, dest: &Path) -> MediaResult<usize> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    std::fs::create_dir_all(dest)?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
            continue;
        };

        let target = dest.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    info!(
        archive = %archive.display(),
        dest = %dest.display(),
        files = extracted,
        "Extracted archive"
    );
    Ok(extracted)
}

/// Bundle every regular file in `src_dir` (non-recursive) into a zip.
///
/// Returns the number of files added.
pub async fn zip_dir(src_dir: impl AsRef<Path>, archive: impl AsRef<Path>) -> MediaResult<usize> {
    let src_dir = src_dir.as_ref().to_path_buf();
    let archive = archive.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || zip_dir_sync(&src_dir, &archive))
        .await
        .map_err(|e| MediaError::internal(format!("archive task panicked: {e}")))?
}

fn zip_dir_sync(src_dir: &Path, archive: &Path) -> MediaResult<usize> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(src_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let file = File::create(archive)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    let mut added = 0;
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(name, options)?;
        let mut src = File::open(&path)?;
        io::copy(&mut src, &mut zip)?;
        added += 1;
    }
    zip.finish()?;

    info!(archive = %archive.display(), files = added, "Created archive");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_zip_and_extract() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("images");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("one.png"), b"png-1").unwrap();
        std::fs::write(src.join("two.png"), b"png-2").unwrap();

        let archive = dir.path().join("training.zip");
        let added = zip_dir_sync(&src, &archive).unwrap();
        assert_eq!(added, 2);

        let out = dir.path().join("out");
        let extracted = extract_zip_sync(&archive, &out).unwrap();
        assert_eq!(extracted, 2);
        assert_eq!(std::fs::read(out.join("one.png")).unwrap(), b"png-1");
        assert_eq!(std::fs::read(out.join("two.png")).unwrap(), b"png-2");
    }

    #[test]
    fn test_extract_skips_traversal_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");

        let file = File::create(&archive).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("../escape.txt", FileOptions::default())
            .unwrap();
        io::Write::write_all(&mut zip, b"nope").unwrap();
        zip.start_file("safe.txt", FileOptions::default()).unwrap();
        io::Write::write_all(&mut zip, b"ok").unwrap();
        zip.finish().unwrap();

        let out = dir.path().join("out");
        let extracted = extract_zip_sync(&archive, &out).unwrap();
        assert_eq!(extracted, 1);
        assert!(out.join("safe.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
