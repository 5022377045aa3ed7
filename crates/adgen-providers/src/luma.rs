//! Luma Dream Machine adapter: image-to-video generation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::download::download_to_file;
use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "luma";
const DEFAULT_BASE_URL: &str = "https://api.lumalabs.ai/dream-machine/v1";

const POLL_INTERVAL_SECS: u64 = 10;
const MAX_POLL_ATTEMPTS: u32 = 120;

#[derive(Debug, Deserialize)]
struct Generation {
    id: String,
    #[serde(default)]
    state: String,
    failure_reason: Option<String>,
    #[serde(default)]
    assets: Option<GenerationAssets>,
    prompt: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationAssets {
    video: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationList {
    #[serde(default)]
    generations: Vec<Generation>,
}

/// A finished generation, as reported by the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedGeneration {
    pub id: String,
    pub prompt: Option<String>,
    pub video_url: String,
    pub created_at: Option<String>,
}

pub struct LumaClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LumaClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("LUMA_API_KEY")
            .map_err(|_| ProviderError::config_error("LUMA_API_KEY not set"))?;
        Ok(Self::new(api_key))
    }

    /// Override the API endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Animate `image_url` into a looping clip and download it to `output`.
    pub async fn generate_video(
        &self,
        prompt: &str,
        image_url: &str,
        output: &Path,
    ) -> ProviderResult<()> {
        info!(output = %output.display(), "Starting Luma video generation");
        let body = json!({
            "prompt": prompt,
            "loop": true,
            "keyframes": {
                "frame0": { "type": "image", "url": image_url }
            }
        });

        let response = self
            .http
            .post(format!("{}/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let generation: Generation = self.parse_response(response).await?;
        info!(id = %generation.id, "Luma generation started");

        let video_url = self.wait_for_video(&generation.id).await?;
        download_to_file(&self.http, &video_url, output).await
    }

    /// Completed generations that still have a downloadable video.
    pub async fn list_generations(
        &self,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<Vec<CompletedGeneration>> {
        let response = self
            .http
            .get(format!(
                "{}/generations?limit={limit}&offset={offset}",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let list: GenerationList = self.parse_response(response).await?;

        Ok(list
            .generations
            .into_iter()
            .filter(|g| g.state == "completed")
            .filter_map(|g| {
                let video_url = g.assets.and_then(|a| a.video)?;
                Some(CompletedGeneration {
                    id: g.id,
                    prompt: g.prompt,
                    video_url,
                    created_at: g.created_at,
                })
            })
            .collect())
    }

    async fn wait_for_video(&self, id: &str) -> ProviderResult<String> {
        for attempt in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .http
                .get(format!("{}/generations/{id}", self.base_url))
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let generation: Generation = self.parse_response(response).await?;

            match generation.state.as_str() {
                "completed" => {
                    return generation
                        .assets
                        .and_then(|a| a.video)
                        .ok_or_else(|| ProviderError::missing_output(PROVIDER, "assets.video"));
                }
                "failed" => {
                    let detail = generation
                        .failure_reason
                        .unwrap_or_else(|| "no failure reason given".to_string());
                    return Err(ProviderError::generation_failed(PROVIDER, detail));
                }
                state => {
                    debug!(id, state, attempt, "Luma generation in progress");
                    tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
                }
            }
        }
        Err(ProviderError::timeout(
            PROVIDER,
            u64::from(MAX_POLL_ATTEMPTS) * POLL_INTERVAL_SECS,
        ))
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
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_video() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/generations"))
            .and(header("authorization", "Bearer test-luma-key"))
            .and(body_partial_json(serde_json::json!({
                "loop": true,
                "keyframes": {"frame0": {"type": "image"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-1",
                "state": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/generations/gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-1",
                "state": "completed",
                "assets": {"video": format!("{}/video.mp4", server.uri())}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4 bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("clip.mp4");
        let client = LumaClient::new("test-luma-key").with_base_url(server.uri());
        client
            .generate_video("tiger in snow", "https://img.example/tiger.jpg", &output)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"mp4 bytes");
    }

    #[tokio::test]
    async fn test_failed_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-2",
                "state": "queued"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generations/gen-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-2",
                "state": "failed",
                "failure_reason": "prompt rejected"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = LumaClient::new("k").with_base_url(server.uri());
        let err = client
            .generate_video("p", "https://img.example/x.jpg", &dir.path().join("o.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prompt rejected"));
    }

    #[tokio::test]
    async fn test_list_generations_filters_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "generations": [
                    {"id": "a", "state": "completed", "prompt": "p1",
                     "assets": {"video": "https://cdn/a.mp4"}, "created_at": "2025-01-01T00:00:00Z"},
                    {"id": "b", "state": "dreaming"},
                    {"id": "c", "state": "completed", "assets": {}}
                ]
            })))
            .mount(&server)
            .await;

        let client = LumaClient::new("k").with_base_url(server.uri());
        let videos = client.list_generations(100, 0).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "a");
        assert_eq!(videos[0].video_url, "https://cdn/a.mp4");
    }
}
