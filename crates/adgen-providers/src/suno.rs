//! Suno music gateway adapter.
//!
//! Talks to a self-hosted suno-api gateway, which proxies Suno's private
//! API and returns clip records. A generation request yields two clips;
//! both become downloadable once their status reaches `streaming`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use adgen_models::{session_timestamp, SongClip, SongQuota};

use crate::download::download_to_file;
use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "suno";
const DEFAULT_BASE_URL: &str = "https://suno-api-eight-weld.vercel.app";

const POLL_INTERVAL_SECS: u64 = 5;
const MAX_POLL_ATTEMPTS: u32 = 60;

/// Lyrics generated by the gateway.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Lyrics {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct CustomGenerateRequest {
    pub prompt: String,
    pub tags: String,
    pub title: String,
    pub make_instrumental: bool,
    pub wait_audio: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtendAudioRequest {
    pub audio_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub struct SunoClient {
    http: reqwest::Client,
    base_url: String,
}

impl SunoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        let base_url =
            std::env::var("SUNO_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    /// Kick off a generation from a style prompt.
    pub async fn generate(
        &self,
        prompt: &str,
        make_instrumental: bool,
        wait_audio: bool,
    ) -> ProviderResult<Vec<SongClip>> {
        info!(make_instrumental, "Requesting song generation");
        self.post_json(
            "/api/generate",
            &json!({
                "prompt": prompt,
                "make_instrumental": make_instrumental,
                "wait_audio": wait_audio
            }),
        )
        .await
    }

    /// Generation with explicit lyrics, tags, and title.
    pub async fn custom_generate(
        &self,
        request: &CustomGenerateRequest,
    ) -> ProviderResult<Vec<SongClip>> {
        info!(title = %request.title, "Requesting custom song generation");
        self.post_json("/api/custom_generate", request).await
    }

    pub async fn get_clips(&self, ids: &[String]) -> ProviderResult<Vec<SongClip>> {
        self.get_json(&format!("/api/get?ids={}", ids.join(","))).await
    }

    /// Poll until every clip is downloadable.
    pub async fn wait_for_clips(&self, ids: &[String]) -> ProviderResult<Vec<SongClip>> {
        for attempt in 0..MAX_POLL_ATTEMPTS {
            let clips = self.get_clips(ids).await?;
            if let Some(failed) = clips.iter().find(|c| c.is_failed()) {
                return Err(ProviderError::generation_failed(
                    PROVIDER,
                    format!("clip {} errored", failed.id),
                ));
            }
            if !clips.is_empty() && clips.iter().all(SongClip::is_ready) {
                return Ok(clips);
            }
            debug!(
                attempt,
                ready = clips.iter().filter(|c| c.is_ready()).count(),
                total = clips.len(),
                "Waiting for song clips"
            );
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
        Err(ProviderError::timeout(
            PROVIDER,
            u64::from(MAX_POLL_ATTEMPTS) * POLL_INTERVAL_SECS,
        ))
    }

    /// Download every ready clip to `dir` as numbered mp3 files.
    pub async fn download_songs(
        &self,
        clips: &[SongClip],
        dir: &Path,
    ) -> ProviderResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;
        let ts = session_timestamp();
        let mut files = Vec::new();
        for (i, clip) in clips.iter().enumerate() {
            let Some(audio_url) = clip.audio_url.as_deref() else {
                warn!(clip_id = %clip.id, "Clip has no audio URL, skipping download");
                continue;
            };
            let path = dir.join(format!("generated_song_{}_{}.mp3", ts, i + 1));
            download_to_file(&self.http, audio_url, &path).await?;
            info!(path = %path.display(), "Downloaded song");
            files.push(path);
        }
        Ok(files)
    }

    pub async fn generate_lyrics(&self, prompt: &str) -> ProviderResult<Lyrics> {
        self.post_json("/api/generate_lyrics", &json!({ "prompt": prompt }))
            .await
    }

    /// Continue an existing clip from a timestamp.
    pub async fn extend_audio(&self, request: &ExtendAudioRequest) -> ProviderResult<SongClip> {
        self.post_json("/api/extend_audio", request).await
    }

    /// Merge an extended clip chain into one whole song.
    pub async fn concat(&self, clip_id: &str) -> ProviderResult<SongClip> {
        self.post_json("/api/concat", &json!({ "clip_id": clip_id }))
            .await
    }

    pub async fn get_clip(&self, id: &str) -> ProviderResult<SongClip> {
        self.get_json(&format!("/api/clip?id={id}")).await
    }

    pub async fn quota(&self) -> ProviderResult<SongQuota> {
        self.get_json("/api/get_limit").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?;
        self.parse_response(response).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        self.parse_response(response).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_returns_clips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "make_instrumental": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "c1", "status": "submitted"},
                {"id": "c2", "status": "submitted"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = SunoClient::new(server.uri());
        let clips = client.generate("upbeat summer pop", true, false).await.unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].id, "c1");
    }

    #[tokio::test]
    async fn test_wait_for_clips_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get"))
            .and(query_param("ids", "c1,c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "c1", "status": "streaming", "audio_url": "https://cdn/c1.mp3"},
                {"id": "c2", "status": "complete", "audio_url": "https://cdn/c2.mp3"}
            ])))
            .mount(&server)
            .await;

        let client = SunoClient::new(server.uri());
        let clips = client
            .wait_for_clips(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert!(clips.iter().all(SongClip::is_ready));
    }

    #[tokio::test]
    async fn test_wait_for_clips_error_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "c1", "status": "error"}
            ])))
            .mount(&server)
            .await;

        let client = SunoClient::new(server.uri());
        let err = client
            .wait_for_clips(&["c1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::GenerationFailed { .. }));
    }

    #[tokio::test]
    async fn test_download_songs_skips_missing_audio() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/songs/c1.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;

        let clips = vec![
            SongClip {
                id: "c1".to_string(),
                status: "streaming".to_string(),
                audio_url: Some(format!("{}/songs/c1.mp3", server.uri())),
                video_url: None,
                title: None,
                lyric: None,
            },
            SongClip {
                id: "c2".to_string(),
                status: "streaming".to_string(),
                audio_url: None,
                video_url: None,
                title: None,
                lyric: None,
            },
        ];

        let dir = TempDir::new().unwrap();
        let client = SunoClient::new(server.uri());
        let files = client.download_songs(&clips, dir.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("_1.mp3"));
    }

    #[tokio::test]
    async fn test_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "credits_left": 40,
                "monthly_limit": 50,
                "monthly_usage": 10
            })))
            .mount(&server)
            .await;

        let client = SunoClient::new(server.uri());
        let quota = client.quota().await.unwrap();
        assert_eq!(quota.credits_left, 40);
        assert_eq!(quota.monthly_usage, 10);
    }

    #[tokio::test]
    async fn test_generate_lyrics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate_lyrics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "verse one...",
                "title": "Summer Nights"
            })))
            .mount(&server)
            .await;

        let client = SunoClient::new(server.uri());
        let lyrics = client.generate_lyrics("a song about summer").await.unwrap();
        assert_eq!(lyrics.title, "Summer Nights");
    }
}
