//! Background style preset listing.

use axum::Json;
use serde::Serialize;

use adgen_models::StylePreset;

/// A style preset and the background prompt it expands to.
#[derive(Debug, Serialize)]
pub struct StyleEntry {
    pub name: &'static str,
    pub prompt: &'static str,
}

/// `GET /api/styles` — the available background style presets.
pub async fn list_styles() -> Json<Vec<StyleEntry>> {
    Json(
        StylePreset::ALL
            .iter()
            .map(|preset| StyleEntry {
                name: preset.as_str(),
                prompt: preset.prompt(),
            })
            .collect(),
    )
}
