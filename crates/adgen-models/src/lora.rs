//! LoRA registry entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A trained LoRA available for image generation.
///
/// Stored one file per entry under the registry directory, named after
/// the trigger word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoraModel {
    /// Token the weights respond to, also the registry key
    pub trigger_word: String,
    /// URL of the trained diffusers weights
    pub lora_url: String,
    /// When training finished
    pub trained_at: DateTime<Utc>,
}

impl LoraModel {
    pub fn new(trigger_word: impl Into<String>, lora_url: impl Into<String>) -> Self {
        Self {
            trigger_word: trigger_word.into(),
            lora_url: lora_url.into(),
            trained_at: Utc::now(),
        }
    }

    /// Registry file name for this entry.
    pub fn registry_file_name(&self) -> String {
        format!("{}_output.json", self.trigger_word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_file_name() {
        let model = LoraModel::new("ACMEBAG", "https://example.com/weights.safetensors");
        assert_eq!(model.registry_file_name(), "ACMEBAG_output.json");
    }
}
