//! Session workspace layout on the data volume.
//!
//! Every generation run gets a timestamped session directory under the data
//! root. Stage subdirectories are created on demand as the pipeline moves
//! through its steps, and artifacts are always addressed by data-root
//! relative paths so API handlers can hand them out safely.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use adgen_models::{session_timestamp, SessionId};

use crate::error::{StorageError, StorageResult};

/// Stage subdirectories used inside a session.
pub mod stage {
    pub const BACKGROUNDS: &str = "backgrounds";
    pub const PROCESSED: &str = "processed";
    pub const OVERLAID: &str = "overlaid";
    pub const VIDEOS: &str = "videos";
    pub const SONGS: &str = "songs";
    pub const BROLL_CUT: &str = "broll_cut";
    pub const BROLL_METADATA: &str = "broll_metadata";
    pub const FINAL: &str = "final";
}

/// A single generation session on disk.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub dir: PathBuf,
}

impl Session {
    /// Path of a file or subdirectory inside the session (no creation).
    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }

    /// Get a stage subdirectory, creating it if needed.
    pub async fn stage_dir(&self, name: &str) -> StorageResult<PathBuf> {
        let dir = self.dir.join(name);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// Store managing session directories under a single data root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store rooted at `ADGEN_DATA_DIR` (default `./data`).
    pub fn from_env() -> Self {
        let root = std::env::var("ADGEN_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self::new(root)
    }

    /// The data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new timestamped session directory.
    pub async fn create_session(&self, prefix: &str) -> StorageResult<Session> {
        let id = SessionId::new(prefix);
        if !id.is_valid() {
            return Err(StorageError::InvalidSessionId(id.to_string()));
        }

        let dir = self.root.join(id.as_str());
        fs::create_dir_all(&dir).await?;

        info!(session_id = %id, dir = %dir.display(), "Created session");
        Ok(Session { id, dir })
    }

    /// Open an existing session by id.
    pub async fn open_session(&self, id: &SessionId) -> StorageResult<Session> {
        if !id.is_valid() {
            return Err(StorageError::InvalidSessionId(id.to_string()));
        }

        let dir = self.root.join(id.as_str());
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::not_found(format!("session {}", id)));
        }

        Ok(Session {
            id: id.clone(),
            dir,
        })
    }

    /// Open a session by id, creating its directory if it does not exist.
    ///
    /// Workers use this on dequeue: the submitting side usually creates the
    /// session, but a redelivered or manually enqueued job must not fail on
    /// a missing directory.
    pub async fn ensure_session(&self, id: &SessionId) -> StorageResult<Session> {
        if !id.is_valid() {
            return Err(StorageError::InvalidSessionId(id.to_string()));
        }

        let dir = self.root.join(id.as_str());
        if !fs::try_exists(&dir).await? {
            fs::create_dir_all(&dir).await?;
            debug!(session_id = %id, dir = %dir.display(), "Created session directory on demand");
        }

        Ok(Session {
            id: id.clone(),
            dir,
        })
    }

    /// List session ids, newest first.
    ///
    /// Session ids end in a sortable timestamp, so reverse name order is
    /// reverse chronological order.
    pub async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let mut sessions = Vec::new();

        if !fs::try_exists(&self.root).await? {
            return Ok(sessions);
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    sessions.push(name.to_string());
                }
            }
        }

        sessions.sort_by(|a, b| b.cmp(a));
        Ok(sessions)
    }

    /// List all regular files under a session as data-root relative paths,
    /// sorted.
    pub async fn list_artifacts(&self, id: &SessionId) -> StorageResult<Vec<String>> {
        let session = self.open_session(id).await?;

        let mut files = Vec::new();
        let mut stack = vec![session.dir.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        files.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Resolve a data-root relative artifact path to an absolute path.
    ///
    /// Rejects absolute paths and any path that escapes the data root once
    /// symlinks are resolved.
    pub async fn resolve_artifact(&self, rel_path: &str) -> StorageResult<PathBuf> {
        let rel = Path::new(rel_path);
        if rel.is_absolute() {
            return Err(StorageError::PathTraversal(rel_path.to_string()));
        }
        if rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(StorageError::PathTraversal(rel_path.to_string()));
        }

        let candidate = self.root.join(rel);
        if !fs::try_exists(&candidate).await? {
            return Err(StorageError::not_found(rel_path.to_string()));
        }

        let canonical = fs::canonicalize(&candidate).await?;
        let canonical_root = fs::canonicalize(&self.root).await?;
        if !canonical.starts_with(&canonical_root) {
            return Err(StorageError::PathTraversal(rel_path.to_string()));
        }

        Ok(canonical)
    }

    /// A timestamped path in `dir` that does not yet exist.
    pub async fn unique_path(&self, dir: &Path, stem: &str, ext: &str) -> StorageResult<PathBuf> {
        let ts = session_timestamp();
        let mut candidate = dir.join(format!("{stem}_{ts}.{ext}"));
        let mut counter = 1;

        while fs::try_exists(&candidate).await? {
            candidate = dir.join(format!("{stem}_{ts}_{counter}.{ext}"));
            counter += 1;
        }

        debug!(path = %candidate.display(), "Allocated unique path");
        Ok(candidate)
    }
}
