//! Gemini adapter: structured clip and image description.
//!
//! Videos go through the Files API (upload, wait for processing) before
//! `generateContent`; images are inlined as base64. Video replies are
//! structured by the [`VideoMetadata`] response schema.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use adgen_media::assembly::collect_videos;
use adgen_media::probe::get_duration;
use adgen_models::VideoMetadata;

use crate::download::mime_for;
use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const VIDEO_MODEL: &str = "gemini-1.5-pro-002";
const IMAGE_MODEL: &str = "gemini-1.5-flash";

const FILE_POLL_INTERVAL_SECS: u64 = 10;
const MAX_FILE_POLL_ATTEMPTS: u32 = 60;
const REQUEST_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_DESCRIBE_CONCURRENCY: usize = 5;

const VIDEO_PROMPT: &str = "Describe this video in detail.\n\
    Capture the camera movements, lighting, and any other details.\n\
    Identify and label the objects in the video.\n\
    If there are humans, describe their clothing, aesthetic, appearance, and actions.\n\
    Output the aesthetics and vibe of the video.";

const IMAGE_PROMPT: &str = "Describe this image in detail. Focus on the subject, \
    composition, colors, and overall aesthetic. Give concise output.";

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: FileInfo,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    name: String,
    uri: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiDescriber {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiDescriber {
    pub fn new(api_key: impl Into<String>) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ProviderError::config_error("GEMINI_API_KEY not set"))?;
        Self::new(api_key)
    }

    /// Override the API endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Push a file through the Files API and wait until it is usable.
    ///
    /// Returns the file URI to reference from `generateContent`.
    pub async fn upload_file(&self, path: &Path) -> ProviderResult<String> {
        if !path.is_file() {
            return Err(ProviderError::FileNotFound(path.to_path_buf()));
        }
        let mime = mime_for(path);
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        // Resumable upload: a start request hands back the session URL,
        // a second request carries the bytes and finalizes.
        let start = self
            .http
            .post(format!(
                "{}/upload/v1beta/files?key={}",
                self.base_url, self.api_key
            ))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let status = start.status();
        if !status.is_success() {
            let text = start.text().await.unwrap_or_default();
            return Err(ProviderError::request_failed(
                PROVIDER,
                Some(status.as_u16()),
                truncate_body(&text),
            ));
        }
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::missing_output(PROVIDER, "upload session URL"))?;

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let envelope: FileEnvelope = self.parse_response(response).await?;
        info!(file = %path.display(), uri = %envelope.file.uri, "Uploaded file to Gemini");

        self.wait_for_file(envelope.file).await
    }

    async fn wait_for_file(&self, mut file: FileInfo) -> ProviderResult<String> {
        for attempt in 0..MAX_FILE_POLL_ATTEMPTS {
            match file.state.as_str() {
                "PROCESSING" => {
                    debug!(name = %file.name, attempt, "Gemini file still processing");
                    tokio::time::sleep(Duration::from_secs(FILE_POLL_INTERVAL_SECS)).await;
                    let response = self
                        .http
                        .get(format!(
                            "{}/v1beta/{}?key={}",
                            self.base_url, file.name, self.api_key
                        ))
                        .send()
                        .await?;
                    file = self.parse_response(response).await?;
                }
                "FAILED" => {
                    return Err(ProviderError::generation_failed(
                        PROVIDER,
                        format!("file {} failed processing", file.name),
                    ));
                }
                _ => return Ok(file.uri),
            }
        }
        Err(ProviderError::timeout(
            PROVIDER,
            u64::from(MAX_FILE_POLL_ATTEMPTS) * FILE_POLL_INTERVAL_SECS,
        ))
    }

    /// Structured description of one video file.
    pub async fn describe_video(&self, path: &Path) -> ProviderResult<VideoMetadata> {
        info!(video = %path.display(), "Describing video");
        let file_uri = self.upload_file(path).await?;

        let body = json!({
            "contents": [{
                "parts": [
                    { "fileData": { "mimeType": mime_for(path), "fileUri": file_uri } },
                    { "text": VIDEO_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": VideoMetadata::response_schema()
            }
        });

        let text = self.generate(VIDEO_MODEL, &body).await?;
        serde_json::from_str(strip_fences(&text)).map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("metadata parse: {e}"))
        })
    }

    /// Free-form description of a still image.
    pub async fn describe_image(&self, path: &Path) -> ProviderResult<String> {
        if !path.is_file() {
            return Err(ProviderError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime_for(path), "data": data } },
                    { "text": IMAGE_PROMPT }
                ]
            }]
        });

        self.generate(IMAGE_MODEL, &body).await
    }

    /// Describe every video in `dir`, a few at a time.
    ///
    /// Per-file failures are logged and dropped so one broken clip cannot
    /// sink the whole directory.
    pub async fn describe_directory(
        &self,
        dir: &Path,
        max_concurrent: usize,
    ) -> ProviderResult<Vec<(PathBuf, VideoMetadata)>> {
        let videos = collect_videos(dir).await?;
        info!(count = videos.len(), dir = %dir.display(), "Describing videos in directory");

        let results: Vec<(PathBuf, ProviderResult<VideoMetadata>)> = stream::iter(videos)
            .map(|video| async move {
                let meta = self.describe_video(&video).await;
                (video, meta)
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        let mut described = Vec::new();
        for (video, result) in results {
            match result {
                Ok(meta) => described.push((video, meta)),
                Err(e) => warn!(video = %video.display(), error = %e, "Failed to describe video"),
            }
        }
        Ok(described)
    }

    /// Write a clip's metadata next to its stem, enriched with the clip
    /// name and probed duration.
    pub async fn save_metadata(
        &self,
        meta: &VideoMetadata,
        video_path: &Path,
        out_dir: &Path,
    ) -> ProviderResult<PathBuf> {
        let stem = video_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ProviderError::FileNotFound(video_path.to_path_buf()))?;

        let mut enriched = meta.clone();
        enriched.video_name = Some(stem.to_string());
        enriched.video_duration_length = Some(get_duration(video_path).await?);

        tokio::fs::create_dir_all(out_dir).await?;
        let out_path = out_dir.join(format!("{stem}_metadata.json"));
        let json = serde_json::to_string_pretty(&enriched)?;
        tokio::fs::write(&out_path, json).await?;
        info!(path = %out_path.display(), "Saved video metadata");
        Ok(out_path)
    }

    async fn generate(&self, model: &str, body: &Value) -> ProviderResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let response = self.http.post(&url).json(body).send().await?;
        let parsed: GenerateResponse = self.parse_response(response).await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::missing_output(PROVIDER, "candidate text"));
        }
        Ok(text)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ProviderResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::request_failed(
                PROVIDER,
                Some(status.as_u16()),
                truncate_body(&text),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e.to_string()))
    }
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata_json() -> serde_json::Value {
        json!({
            "video_description": "slow dolly over sneakers",
            "objects_in_video": ["sneaker"],
            "humans_in_video": [],
            "fashion_aesthetics_of_humans": [],
            "aesthetics_and_vibe_of_scene": "clean studio light"
        })
    }

    async fn mount_upload(server: &MockServer, state: &str) {
        Mock::given(method("POST"))
            .and(url_path("/upload/v1beta/files"))
            .and(query_param("key", "test-gemini-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri()).as_str()),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/upload-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/f1",
                    "uri": "https://generativelanguage.googleapis.com/v1beta/files/f1",
                    "state": state
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_describe_video_round_trip() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;

        let reply = format!("```json\n{}\n```", metadata_json());
        Mock::given(method("POST"))
            .and(url_path(format!("/v1beta/models/{VIDEO_MODEL}:generateContent")))
            .and(query_param("key", "test-gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": reply}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        tokio::fs::write(&video, b"fake mp4").await.unwrap();

        let describer = GeminiDescriber::new("test-gemini-key")
            .unwrap()
            .with_base_url(server.uri());
        let meta = describer.describe_video(&video).await.unwrap();
        assert_eq!(meta.video_description, "slow dolly over sneakers");
        assert_eq!(meta.objects_in_video, vec!["sneaker"]);
        assert!(meta.video_name.is_none());
    }

    #[tokio::test]
    async fn test_upload_polls_processing_file() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(url_path("/v1beta/files/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/f1",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/f1",
                "state": "ACTIVE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        tokio::fs::write(&video, b"fake mp4").await.unwrap();

        let describer = GeminiDescriber::new("test-gemini-key")
            .unwrap()
            .with_base_url(server.uri());
        let uri = describer.upload_file(&video).await.unwrap();
        assert!(uri.ends_with("files/f1"));
    }

    #[tokio::test]
    async fn test_describe_image_inlines_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path(format!("/v1beta/models/{IMAGE_MODEL}:generateContent")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "a white sneaker on a plinth"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = dir.path().join("shot.png");
        tokio::fs::write(&image, b"fake png").await.unwrap();

        let describer = GeminiDescriber::new("test-gemini-key")
            .unwrap()
            .with_base_url(server.uri());
        let description = describer.describe_image(&image).await.unwrap();
        assert_eq!(description, "a white sneaker on a plinth");
    }

    #[tokio::test]
    async fn test_failed_file_processing() {
        let server = MockServer::start().await;
        mount_upload(&server, "FAILED").await;

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        tokio::fs::write(&video, b"fake mp4").await.unwrap();

        let describer = GeminiDescriber::new("test-gemini-key")
            .unwrap()
            .with_base_url(server.uri());
        let err = describer.upload_file(&video).await.unwrap_err();
        assert!(matches!(err, ProviderError::GenerationFailed { .. }));
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
