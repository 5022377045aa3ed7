//! Structured clip descriptions produced by the video-understanding model.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// Description of a video clip (or still image) as the sequencing model
/// consumes it.
///
/// The first five fields form the response schema sent to Gemini; the
/// trailing two are filled in locally when the description is saved next
/// to its clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Free-form description: camera movement, lighting, pacing
    pub video_description: String,
    /// Objects visible in the clip
    pub objects_in_video: Vec<String>,
    /// People visible in the clip
    pub humans_in_video: Vec<String>,
    /// What the people are wearing / their styling
    pub fashion_aesthetics_of_humans: Vec<String>,
    /// Overall mood and look of the scene
    pub aesthetics_and_vibe_of_scene: String,

    /// File stem of the described clip, set during save
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub video_name: Option<String>,
    /// Clip duration in seconds, probed during save
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub video_duration_length: Option<f64>,
}

impl VideoMetadata {
    /// JSON schema for the model's structured-output request.
    pub fn response_schema() -> serde_json::Value {
        let schema = schema_for!(VideoMetadata);
        serde_json::to_value(schema.schema).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_omits_local_fields() {
        let schema = VideoMetadata::response_schema();
        let props = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .expect("schema has properties");

        assert!(props.contains_key("video_description"));
        assert!(props.contains_key("objects_in_video"));
        assert!(props.contains_key("aesthetics_and_vibe_of_scene"));
        assert!(!props.contains_key("video_name"));
        assert!(!props.contains_key("video_duration_length"));
    }

    #[test]
    fn test_enriched_fields_serialize_when_present() {
        let meta = VideoMetadata {
            video_description: "slow pan over a desk".into(),
            objects_in_video: vec!["laptop".into()],
            humans_in_video: vec![],
            fashion_aesthetics_of_humans: vec![],
            aesthetics_and_vibe_of_scene: "calm, warm light".into(),
            video_name: Some("desk_shot".into()),
            video_duration_length: Some(3.4),
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"video_name\":\"desk_shot\""));
        assert!(json.contains("\"video_duration_length\":3.4"));
    }

    #[test]
    fn test_deserializes_model_reply_without_local_fields() {
        let json = r#"{
            "video_description": "d",
            "objects_in_video": [],
            "humans_in_video": [],
            "fashion_aesthetics_of_humans": [],
            "aesthetics_and_vibe_of_scene": "v"
        }"#;
        let meta: VideoMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.video_name.is_none());
        assert!(meta.video_duration_length.is_none());
    }
}
