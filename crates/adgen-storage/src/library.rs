//! Persistent asset library: uploaded b-roll and trained LoRA registry.
//!
//! Unlike sessions, these directories outlive individual generation runs.

use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use adgen_models::LoraModel;

use crate::error::StorageResult;

/// Directory holding uploaded b-roll videos.
const BROLL_DIR: &str = "b_roll_videos";

/// Directory holding `<trigger_word>_output.json` registry entries.
const LORA_DIR: &str = "lora_trained";

/// Long-lived assets stored next to the session directories.
#[derive(Debug, Clone)]
pub struct AssetLibrary {
    root: PathBuf,
}

impl AssetLibrary {
    /// Create a library rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a library rooted at `ADGEN_DATA_DIR` (default `./data`).
    pub fn from_env() -> Self {
        let root = std::env::var("ADGEN_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self::new(root)
    }

    /// Path of the b-roll library directory.
    pub fn broll_dir(&self) -> PathBuf {
        self.root.join(BROLL_DIR)
    }

    /// B-roll library directory, created if needed.
    pub async fn ensure_broll_dir(&self) -> StorageResult<PathBuf> {
        let dir = self.broll_dir();
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Path of the LoRA registry directory.
    pub fn lora_dir(&self) -> PathBuf {
        self.root.join(LORA_DIR)
    }

    /// Save a trained LoRA to the registry.
    pub async fn save_lora(&self, model: &LoraModel) -> StorageResult<PathBuf> {
        let dir = self.lora_dir();
        fs::create_dir_all(&dir).await?;

        let path = dir.join(model.registry_file_name());
        fs::write(&path, serde_json::to_string_pretty(model)?).await?;

        info!(
            trigger_word = %model.trigger_word,
            path = %path.display(),
            "Saved LoRA to registry"
        );
        Ok(path)
    }

    /// Load a LoRA registry entry by trigger word.
    pub async fn load_lora(&self, trigger_word: &str) -> StorageResult<Option<LoraModel>> {
        let path = self
            .lora_dir()
            .join(format!("{trigger_word}_output.json"));

        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path).await?;
        let model = serde_json::from_str(&raw)?;
        Ok(Some(model))
    }

    /// List all registry entries, sorted by trigger word.
    ///
    /// Unparsable files are skipped with a warning rather than failing the
    /// whole listing.
    pub async fn list_loras(&self) -> StorageResult<Vec<LoraModel>> {
        let dir = self.lora_dir();
        let mut models = Vec::new();

        if !fs::try_exists(&dir).await? {
            return Ok(models);
        }

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_registry_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_output.json"))
                .unwrap_or(false);
            if !is_registry_file {
                continue;
            }

            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<LoraModel>(&raw) {
                Ok(model) => models.push(model),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable LoRA entry");
                }
            }
        }

        models.sort_by(|a, b| a.trigger_word.cmp(&b.trigger_word));
        Ok(models)
    }

    /// Erase a registry entry. Missing entries are not an error.
    pub async fn delete_lora(&self, trigger_word: &str) -> StorageResult<bool> {
        let path = self
            .lora_dir()
            .join(format!("{trigger_word}_output.json"));

        if !fs::try_exists(&path).await? {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load_lora() {
        let dir = TempDir::new().unwrap();
        let library = AssetLibrary::new(dir.path());

        let model = LoraModel::new("acmebottle", "https://cdn.example.com/lora.safetensors");
        let path = library.save_lora(&model).await.unwrap();
        assert!(path.ends_with("acmebottle_output.json"));

        let loaded = library.load_lora("acmebottle").await.unwrap().unwrap();
        assert_eq!(loaded.trigger_word, "acmebottle");
        assert_eq!(loaded.lora_url, "https://cdn.example.com/lora.safetensors");
    }

    #[tokio::test]
    async fn test_load_missing_lora_is_none() {
        let dir = TempDir::new().unwrap();
        let library = AssetLibrary::new(dir.path());

        assert!(library.load_lora("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_loras_skips_bad_entries() {
        let dir = TempDir::new().unwrap();
        let library = AssetLibrary::new(dir.path());

        library
            .save_lora(&LoraModel::new("beta", "https://cdn.example.com/b.safetensors"))
            .await
            .unwrap();
        library
            .save_lora(&LoraModel::new("alpha", "https://cdn.example.com/a.safetensors"))
            .await
            .unwrap();
        fs::write(library.lora_dir().join("broken_output.json"), b"not json")
            .await
            .unwrap();

        let models = library.list_loras().await.unwrap();
        let words: Vec<_> = models.iter().map(|m| m.trigger_word.as_str()).collect();
        assert_eq!(words, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_delete_lora() {
        let dir = TempDir::new().unwrap();
        let library = AssetLibrary::new(dir.path());

        library
            .save_lora(&LoraModel::new("gone", "https://cdn.example.com/g.safetensors"))
            .await
            .unwrap();

        assert!(library.delete_lora("gone").await.unwrap());
        assert!(!library.delete_lora("gone").await.unwrap());
    }
}
