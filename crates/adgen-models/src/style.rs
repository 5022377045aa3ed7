//! Background style presets for product-still generation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Available background styles.
///
/// Each preset expands to a full generation prompt for the background
/// image behind the product cutout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StylePreset {
    Colorful,
    Cyberpunk,
    Floral,
    Minimalist,
    Vintage,
    Abstract,
    Futuristic,
    Nature,
    Industrial,
    PopArt,
}

impl StylePreset {
    /// All available presets, in display order.
    pub const ALL: &'static [StylePreset] = &[
        StylePreset::Colorful,
        StylePreset::Cyberpunk,
        StylePreset::Floral,
        StylePreset::Minimalist,
        StylePreset::Vintage,
        StylePreset::Abstract,
        StylePreset::Futuristic,
        StylePreset::Nature,
        StylePreset::Industrial,
        StylePreset::PopArt,
    ];

    /// The background-generation prompt for this preset.
    pub fn prompt(&self) -> &'static str {
        match self {
            StylePreset::Colorful => "colorful vibrant pattern background art high definition",
            StylePreset::Cyberpunk => "modern neon lights pattern background art high definition",
            StylePreset::Floral => "floral print pattern background art high definition",
            StylePreset::Minimalist => {
                "clean minimalist geometric pattern background art high definition"
            }
            StylePreset::Vintage => "retro vintage texture pattern background art high definition",
            StylePreset::Abstract => {
                "abstract expressionist painting pattern background art high definition"
            }
            StylePreset::Futuristic => {
                "sleek futuristic sci-fi pattern background art high definition"
            }
            StylePreset::Nature => {
                "serene natural landscape pattern background art high definition"
            }
            StylePreset::Industrial => {
                "gritty industrial urban pattern background art high definition"
            }
            StylePreset::PopArt => "bold pop art style pattern background art high definition",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StylePreset::Colorful => "colorful",
            StylePreset::Cyberpunk => "cyberpunk",
            StylePreset::Floral => "floral",
            StylePreset::Minimalist => "minimalist",
            StylePreset::Vintage => "vintage",
            StylePreset::Abstract => "abstract",
            StylePreset::Futuristic => "futuristic",
            StylePreset::Nature => "nature",
            StylePreset::Industrial => "industrial",
            StylePreset::PopArt => "pop_art",
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StylePreset {
    type Err = StylePresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "colorful" => Ok(StylePreset::Colorful),
            "cyberpunk" => Ok(StylePreset::Cyberpunk),
            "floral" => Ok(StylePreset::Floral),
            "minimalist" => Ok(StylePreset::Minimalist),
            "vintage" => Ok(StylePreset::Vintage),
            "abstract" => Ok(StylePreset::Abstract),
            "futuristic" => Ok(StylePreset::Futuristic),
            "nature" => Ok(StylePreset::Nature),
            "industrial" => Ok(StylePreset::Industrial),
            "pop_art" => Ok(StylePreset::PopArt),
            _ => Err(StylePresetParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown style preset: {0}")]
pub struct StylePresetParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_round_trip() {
        for preset in StylePreset::ALL {
            let parsed: StylePreset = preset.as_str().parse().unwrap();
            assert_eq!(parsed, *preset);
        }
    }

    #[test]
    fn test_prompts_share_suffix() {
        for preset in StylePreset::ALL {
            assert!(
                preset.prompt().ends_with("pattern background art high definition"),
                "prompt for {} drifted",
                preset
            );
        }
    }

    #[test]
    fn test_unknown_preset_rejected() {
        assert!("vaporwave".parse::<StylePreset>().is_err());
    }
}
