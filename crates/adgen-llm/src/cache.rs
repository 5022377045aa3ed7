//! Disk cache for model replies.
//!
//! Replies are keyed by a digest of the service, model, and full message
//! list, so an identical conversation never pays for a second completion.
//! The cache is strictly best-effort: read and write failures are logged
//! and otherwise ignored.

use std::path::{Path, PathBuf};

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::types::{ChatMessage, Service};

pub const DEFAULT_CACHE_DIR: &str = "llm_cache";

/// Digest identifying one exact completion request.
///
/// The key material is a canonical JSON document; `serde_json` maps are
/// key-ordered, so the digest is stable across runs.
pub fn cache_key(service: Service, model: &str, messages: &[ChatMessage]) -> String {
    let canonical = json!({
        "messages": messages
            .iter()
            .map(|m| json!({"content": m.content, "role": m.role}))
            .collect::<Vec<_>>(),
        "model": model,
        "service": service.as_str(),
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        let dir = std::env::var("ADGEN_LLM_CACHE_DIR")
            .unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string());
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    /// Look up a cached reply. Any read failure counts as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(key, "LLM cache hit");
                Some(text)
            }
            Err(_) => None,
        }
    }

    /// Store a reply. Failures are logged, not returned.
    pub async fn put(&self, key: &str, reply: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "Failed to create LLM cache dir");
            return;
        }
        let path = self.entry_path(key);
        if let Err(e) = tokio::fs::write(&path, reply).await {
            warn!(path = %path.display(), error = %e, "Failed to write LLM cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("Name one color."),
        ]
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = cache_key(Service::Groq, "llama-3.1-70b-versatile", &messages());
        let b = cache_key(Service::Groq, "llama-3.1-70b-versatile", &messages());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_varies_by_inputs() {
        let base = cache_key(Service::Groq, "llama-3.1-70b-versatile", &messages());
        assert_ne!(
            base,
            cache_key(Service::Claude, "llama-3.1-70b-versatile", &messages())
        );
        assert_ne!(base, cache_key(Service::Groq, "llama3-8b-8192", &messages()));
        assert_ne!(
            base,
            cache_key(
                Service::Groq,
                "llama-3.1-70b-versatile",
                &[ChatMessage::user("Name two colors.")]
            )
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let key = cache_key(Service::Groq, "llama3-8b-8192", &messages());

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, "blue").await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("blue"));
    }

    #[tokio::test]
    async fn test_put_creates_dir() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path().join("nested").join("cache"));
        cache.put("abc", "cached").await;
        assert_eq!(cache.get("abc").await.as_deref(), Some("cached"));
    }
}
