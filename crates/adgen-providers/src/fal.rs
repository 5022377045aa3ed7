//! FAL queue adapter: Runway video, Flux-LoRA images, LoRA training, and
//! inpainting.
//!
//! FAL runs everything through one queue API: submit a request, poll its
//! status URL, fetch the result payload once the status goes `COMPLETED`.
//! Files are staged through FAL's storage service first.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::download::{download_to_file, mime_for};
use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "fal";
const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";
const DEFAULT_REST_URL: &str = "https://rest.alpha.fal.ai";

pub const RUNWAY_MODEL: &str = "fal-ai/runway-gen3/turbo/image-to-video";
pub const FLUX_LORA_MODEL: &str = "fal-ai/flux-lora";
pub const FLUX_LORA_INPAINTING_MODEL: &str = "fal-ai/flux-lora/inpainting";
pub const LORA_TRAINING_MODEL: &str = "fal-ai/flux-lora-fast-training";

pub const DEFAULT_INPAINT_PROMPT: &str =
    "product commercial photoshoot vibrant colorful background";

const POLL_INTERVAL_SECS: u64 = 2;
const MAX_POLL_ATTEMPTS: u32 = 900;

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    #[serde(default)]
    status: String,
    queue_position: Option<u32>,
}

pub struct FalClient {
    http: reqwest::Client,
    api_key: String,
    queue_url: String,
    rest_url: String,
}

impl FalClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("FAL_KEY")
            .or_else(|_| std::env::var("FAL_API_KEY"))
            .map_err(|_| ProviderError::config_error("FAL_KEY not set"))?;
        Ok(Self::new(api_key))
    }

    /// Override the queue and storage endpoints, for tests.
    pub fn with_base_urls(
        mut self,
        queue_url: impl Into<String>,
        rest_url: impl Into<String>,
    ) -> Self {
        self.queue_url = queue_url.into();
        self.rest_url = rest_url.into();
        self
    }

    /// Stage a local file on FAL storage and return its public URL.
    pub async fn upload_file(&self, path: &Path) -> ProviderResult<String> {
        if !path.is_file() {
            return Err(ProviderError::FileNotFound(path.to_path_buf()));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");

        let response = self
            .http
            .post(format!("{}/storage/upload/initiate", self.rest_url))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&json!({
                "file_name": file_name,
                "content_type": mime_for(path),
            }))
            .send()
            .await?;
        let initiate: InitiateUploadResponse = self.parse_response(response).await?;

        let bytes = tokio::fs::read(path).await?;
        let put = self
            .http
            .put(&initiate.upload_url)
            .header("Content-Type", mime_for(path))
            .body(bytes)
            .send()
            .await?;
        let status = put.status();
        if !status.is_success() {
            let text = put.text().await.unwrap_or_default();
            return Err(ProviderError::request_failed(
                PROVIDER,
                Some(status.as_u16()),
                truncate_body(&text),
            ));
        }

        debug!(file = %path.display(), url = %initiate.file_url, "Uploaded file to FAL storage");
        Ok(initiate.file_url)
    }

    /// Submit a queue request and wait for its result payload.
    pub async fn subscribe(&self, model: &str, payload: &Value) -> ProviderResult<Value> {
        let response = self
            .http
            .post(format!("{}/{model}", self.queue_url))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(payload)
            .send()
            .await?;
        let submitted: SubmitResponse = self.parse_response(response).await?;
        info!(model, request_id = %submitted.request_id, "Submitted FAL request");

        let mut last_status = String::new();
        for _ in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .http
                .get(format!(
                    "{}/{model}/requests/{}/status",
                    self.queue_url, submitted.request_id
                ))
                .header("Authorization", format!("Key {}", self.api_key))
                .send()
                .await?;
            let queue_status: QueueStatus = self.parse_response(response).await?;

            if queue_status.status != last_status {
                match queue_status.status.as_str() {
                    "IN_QUEUE" => {
                        info!(model, position = ?queue_status.queue_position, "FAL request queued")
                    }
                    "IN_PROGRESS" => info!(model, "FAL request in progress"),
                    other => debug!(model, status = other, "FAL request status"),
                }
                last_status = queue_status.status.clone();
            }

            match queue_status.status.as_str() {
                "COMPLETED" => {
                    let response = self
                        .http
                        .get(format!(
                            "{}/{model}/requests/{}",
                            self.queue_url, submitted.request_id
                        ))
                        .header("Authorization", format!("Key {}", self.api_key))
                        .send()
                        .await?;
                    return self.parse_response(response).await;
                }
                "FAILED" => {
                    return Err(ProviderError::generation_failed(
                        PROVIDER,
                        format!("{model} request {} failed", submitted.request_id),
                    ));
                }
                _ => tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await,
            }
        }
        Err(ProviderError::timeout(
            PROVIDER,
            u64::from(MAX_POLL_ATTEMPTS) * POLL_INTERVAL_SECS,
        ))
    }

    /// Animate a still image with Runway Gen-3 and download the clip.
    pub async fn generate_runway_video(
        &self,
        prompt: &str,
        image_path: &Path,
        output: &Path,
    ) -> ProviderResult<()> {
        info!(output = %output.display(), "Starting Runway video generation");
        let image_url = self.upload_file(image_path).await?;
        let result = self
            .subscribe(
                RUNWAY_MODEL,
                &json!({
                    "prompt": prompt,
                    "image_url": image_url,
                    "duration": "5",
                    "ratio": "9:16"
                }),
            )
            .await?;

        let video_url = result
            .pointer("/video/url")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::missing_output(PROVIDER, "video.url"))?;
        download_to_file(&self.http, video_url, output).await
    }

    /// Render an image with a trained LoRA applied.
    pub async fn generate_lora_image(
        &self,
        prompt: &str,
        lora_url: &str,
        output: &Path,
    ) -> ProviderResult<()> {
        info!(output = %output.display(), "Generating Flux-LoRA image");
        let result = self
            .subscribe(
                FLUX_LORA_MODEL,
                &json!({
                    "prompt": prompt,
                    "model_name": null,
                    "loras": [{ "path": lora_url, "scale": 1 }],
                    "embeddings": [],
                    "enable_safety_checker": true
                }),
            )
            .await?;

        if let Some(seed) = result.get("seed") {
            debug!(%seed, "Flux-LoRA seed");
        }
        if let Some(inference) = result.pointer("/timings/inference") {
            debug!(%inference, "Flux-LoRA inference seconds");
        }
        if result
            .pointer("/has_nsfw_concepts/0")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            warn!("Flux-LoRA flagged the output as NSFW");
        }

        let image_url = first_image_url(&result)?;
        download_to_file(&self.http, image_url, output).await
    }

    /// Repaint the masked region of an image.
    ///
    /// The mask is white where new content goes. Without an explicit
    /// prompt, the product-shoot default is used.
    pub async fn inpaint(
        &self,
        prompt: Option<&str>,
        image_path: &Path,
        mask_path: &Path,
        output: &Path,
    ) -> ProviderResult<()> {
        info!(output = %output.display(), "Inpainting with Flux-LoRA");
        let image_url = self.upload_file(image_path).await?;
        let mask_url = self.upload_file(mask_path).await?;
        let result = self
            .subscribe(
                FLUX_LORA_INPAINTING_MODEL,
                &json!({
                    "prompt": prompt.unwrap_or(DEFAULT_INPAINT_PROMPT),
                    "image_url": image_url,
                    "mask_url": mask_url
                }),
            )
            .await?;

        let image_url = first_image_url(&result)?;
        download_to_file(&self.http, image_url, output).await
    }

    /// Train a LoRA from a zip of subject photos; returns the weights URL.
    pub async fn train_lora(
        &self,
        archive_path: &Path,
        trigger_word: &str,
        steps: u32,
    ) -> ProviderResult<String> {
        info!(trigger_word, steps, "Starting LoRA training");
        let images_data_url = self.upload_file(archive_path).await?;
        let result = self
            .subscribe(
                LORA_TRAINING_MODEL,
                &json!({
                    "images_data_url": images_data_url,
                    "trigger_word": trigger_word,
                    "steps": steps,
                    "create_masks": true
                }),
            )
            .await?;

        result
            .pointer("/diffusers_lora_file/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::missing_output(PROVIDER, "diffusers_lora_file.url"))
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

fn first_image_url(result: &Value) -> ProviderResult<&str> {
    result
        .pointer("/images/0/url")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::missing_output(PROVIDER, "images[0].url"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_upload(server: &MockServer, file_url: &str) {
        Mock::given(method("POST"))
            .and(path("/storage/upload/initiate"))
            .and(header("authorization", "Key test-fal-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_url": format!("{}/storage/put/object", server.uri()),
                "file_url": file_url
            })))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/storage/put/object"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_upload_file() {
        let server = MockServer::start().await;
        mount_upload(&server, "https://fal.media/files/u1.png").await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("photo.png");
        tokio::fs::write(&file, b"png").await.unwrap();

        let client = FalClient::new("test-fal-key").with_base_urls(server.uri(), server.uri());
        let url = client.upload_file(&file).await.unwrap();
        assert_eq!(url, "https://fal.media/files/u1.png");
    }

    #[tokio::test]
    async fn test_runway_video_round_trip() {
        let server = MockServer::start().await;
        mount_upload(&server, "https://fal.media/files/frame.png").await;

        Mock::given(method("POST"))
            .and(path(format!("/{RUNWAY_MODEL}")))
            .and(body_partial_json(serde_json::json!({
                "duration": "5",
                "ratio": "9:16"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/{RUNWAY_MODEL}/requests/req-1/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/{RUNWAY_MODEL}/requests/req-1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "video": {"url": format!("{}/clip.mp4", server.uri())}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = dir.path().join("frame.png");
        tokio::fs::write(&image, b"png").await.unwrap();
        let output = dir.path().join("out").join("clip.mp4");

        let client = FalClient::new("test-fal-key").with_base_urls(server.uri(), server.uri());
        client
            .generate_runway_video("bunny eating", &image, &output)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_subscribe_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{FLUX_LORA_MODEL}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{FLUX_LORA_MODEL}/requests/req-2/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "FAILED"
            })))
            .mount(&server)
            .await;

        let client = FalClient::new("test-fal-key").with_base_urls(server.uri(), server.uri());
        let err = client
            .subscribe(FLUX_LORA_MODEL, &serde_json::json!({"prompt": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::GenerationFailed { .. }));
    }

    #[tokio::test]
    async fn test_train_lora_returns_weights_url() {
        let server = MockServer::start().await;
        mount_upload(&server, "https://fal.media/files/photos.zip").await;

        Mock::given(method("POST"))
            .and(path(format!("/{LORA_TRAINING_MODEL}")))
            .and(body_partial_json(serde_json::json!({
                "trigger_word": "SNEAKERX",
                "steps": 1000,
                "create_masks": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-3"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{LORA_TRAINING_MODEL}/requests/req-3/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{LORA_TRAINING_MODEL}/requests/req-3")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "diffusers_lora_file": {"url": "https://fal.media/weights.safetensors"}
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("photos.zip");
        tokio::fs::write(&archive, b"zip").await.unwrap();

        let client = FalClient::new("test-fal-key").with_base_urls(server.uri(), server.uri());
        let url = client.train_lora(&archive, "SNEAKERX", 1000).await.unwrap();
        assert_eq!(url, "https://fal.media/weights.safetensors");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let server = MockServer::start().await;
        let client = FalClient::new("k").with_base_urls(server.uri(), server.uri());
        let err = client
            .upload_file(Path::new("/nonexistent/file.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FileNotFound(_)));
    }
}
