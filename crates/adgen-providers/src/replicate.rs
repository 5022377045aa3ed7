//! Replicate adapter: Flux text-to-image, Flux inpainting, and background
//! removal.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::download::{download_to_file, mime_for};
use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "replicate";
const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

const FLUX_PRO_PATH: &str = "/v1/models/black-forest-labs/flux-pro/predictions";
const FLUX_INPAINTING_VERSION: &str =
    "ca8350ff748d56b3ebbd5a12bd3436c2214262a4ff8619de9890ecc41751a008";
const REMBG_VERSION: &str = "fb8af171cfa1616ddcf1242c093f9c46bcada5ad4cf6f2fbe8b81b330ec5c003";

const POLL_INTERVAL_SECS: u64 = 5;
const MAX_POLL_ATTEMPTS: u32 = 120;

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: String,
    #[serde(default)]
    urls: PredictionUrls,
    output: Option<Value>,
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

pub struct ReplicateClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ReplicateClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("REPLICATE_API_TOKEN")
            .map_err(|_| ProviderError::config_error("REPLICATE_API_TOKEN not set"))?;
        Ok(Self::new(api_key))
    }

    /// Override the API endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Text-to-image with Flux Pro, framed for vertical video.
    pub async fn generate_flux_image(&self, prompt: &str, output: &Path) -> ProviderResult<()> {
        info!(output = %output.display(), "Generating Flux image");
        let body = json!({
            "input": {
                "prompt": prompt,
                "steps": 25,
                "guidance": 3,
                "interval": 2,
                "aspect_ratio": "9:16",
                "output_format": "webp",
                "output_quality": 80,
                "safety_tolerance": 2
            }
        });
        let poll_url = self
            .create_prediction(&format!("{}{}", self.base_url, FLUX_PRO_PATH), &body)
            .await?;
        let result = self.poll_prediction(&poll_url).await?;
        let image_url = first_output_url(&result)?;
        download_to_file(&self.http, image_url, output).await
    }

    /// Inpaint `image` where `mask` is white.
    ///
    /// `image` and `mask` each accept an `https://` URL or a local file,
    /// which is inlined as a base64 data URI.
    pub async fn inpaint(
        &self,
        image: &str,
        mask: &str,
        prompt: &str,
        output: &Path,
    ) -> ProviderResult<()> {
        info!(output = %output.display(), "Inpainting with flux-dev-inpainting");
        let body = json!({
            "version": FLUX_INPAINTING_VERSION,
            "input": {
                "mask": prepare_image_source(mask).await?,
                "image": prepare_image_source(image).await?,
                "prompt": prompt,
                "strength": 0.85,
                "output_format": "png",
                "output_quality": 80,
                "num_inference_steps": 25
            }
        });
        let poll_url = self
            .create_prediction(&format!("{}/v1/predictions", self.base_url), &body)
            .await?;
        let result = self.poll_prediction(&poll_url).await?;
        let image_url = first_output_url(&result)?;
        download_to_file(&self.http, image_url, output).await
    }

    /// Cut the subject out of `image`; the result is a transparent PNG.
    pub async fn remove_background(&self, image: &str, output: &Path) -> ProviderResult<()> {
        info!(output = %output.display(), "Removing background with rembg");
        let body = json!({
            "version": REMBG_VERSION,
            "input": { "image": prepare_image_source(image).await? }
        });
        let poll_url = self
            .create_prediction(&format!("{}/v1/predictions", self.base_url), &body)
            .await?;
        let result = self.poll_prediction(&poll_url).await?;
        let image_url = first_output_url(&result)?;
        download_to_file(&self.http, image_url, output).await
    }

    async fn create_prediction(&self, url: &str, body: &Value) -> ProviderResult<String> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 201 {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::request_failed(
                PROVIDER,
                Some(status.as_u16()),
                truncate_body(&text),
            ));
        }

        let prediction: Prediction = response.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("prediction parse: {e}"))
        })?;
        prediction
            .urls
            .get
            .ok_or_else(|| ProviderError::missing_output(PROVIDER, "prediction poll URL"))
    }

    async fn poll_prediction(&self, poll_url: &str) -> ProviderResult<Value> {
        for attempt in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::request_failed(
                    PROVIDER,
                    Some(status.as_u16()),
                    truncate_body(&text),
                ));
            }

            let prediction: Prediction = response.json().await.map_err(|e| {
                ProviderError::invalid_response(PROVIDER, format!("prediction parse: {e}"))
            })?;
            debug!(status = %prediction.status, attempt, "Replicate prediction status");

            match prediction.status.as_str() {
                "succeeded" => {
                    return prediction
                        .output
                        .ok_or_else(|| ProviderError::missing_output(PROVIDER, "output"));
                }
                "failed" | "canceled" => {
                    let detail = prediction
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| prediction.status.clone());
                    return Err(ProviderError::generation_failed(PROVIDER, detail));
                }
                _ => tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await,
            }
        }
        Err(ProviderError::timeout(
            PROVIDER,
            u64::from(MAX_POLL_ATTEMPTS) * POLL_INTERVAL_SECS,
        ))
    }
}

/// Pull a download URL out of a prediction output, which is either a bare
/// string or a list of them.
fn first_output_url(output: &Value) -> ProviderResult<&str> {
    match output {
        Value::String(url) => Ok(url.as_str()),
        Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::missing_output(PROVIDER, "output URL")),
        _ => Err(ProviderError::invalid_response(
            PROVIDER,
            format!("unexpected output shape: {output}"),
        )),
    }
}

/// Pass URLs through; inline local files as data URIs.
async fn prepare_image_source(source: &str) -> ProviderResult<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(source.to_string());
    }
    let path = Path::new(source);
    if !path.is_file() {
        return Err(ProviderError::FileNotFound(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{}", mime_for(path), encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_flux_image() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/v1/predictions/p1", server.uri());

        Mock::given(method("POST"))
            .and(path(FLUX_PRO_PATH))
            .and(body_partial_json(serde_json::json!({
                "input": {"aspect_ratio": "9:16", "steps": 25}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "status": "starting",
                "urls": {"get": poll_url}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "succeeded",
                "output": [format!("{}/out.webp", server.uri())]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/out.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"webp bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("image.webp");
        let client = ReplicateClient::new("test-token").with_base_url(server.uri());
        client
            .generate_flux_image("a red shoe", &output)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"webp bytes");
    }

    #[tokio::test]
    async fn test_failed_prediction_carries_detail() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/v1/predictions/p2", server.uri());

        Mock::given(method("POST"))
            .and(path(FLUX_PRO_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "status": "starting",
                "urls": {"get": poll_url}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": "NSFW content detected"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = ReplicateClient::new("test-token").with_base_url(server.uri());
        let err = client
            .generate_flux_image("bad prompt", &dir.path().join("x.webp"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NSFW content detected"));
    }

    #[tokio::test]
    async fn test_create_rejects_non_201() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FLUX_PRO_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid input"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = ReplicateClient::new("test-token").with_base_url(server.uri());
        let err = client
            .generate_flux_image("p", &dir.path().join("x.webp"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RequestFailed {
                status: Some(422),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prepare_image_source() {
        let url = "https://example.com/img.png";
        assert_eq!(prepare_image_source(url).await.unwrap(), url);

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("img.png");
        tokio::fs::write(&file, b"pngdata").await.unwrap();
        let data_uri = prepare_image_source(file.to_str().unwrap()).await.unwrap();
        assert!(data_uri.starts_with("data:image/png;base64,"));

        let missing = dir.path().join("absent.png");
        assert!(matches!(
            prepare_image_source(missing.to_str().unwrap()).await,
            Err(ProviderError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_first_output_url() {
        assert_eq!(
            first_output_url(&serde_json::json!("https://a/b.png")).unwrap(),
            "https://a/b.png"
        );
        assert_eq!(
            first_output_url(&serde_json::json!(["https://a/1.png", "https://a/2.png"])).unwrap(),
            "https://a/1.png"
        );
        assert!(first_output_url(&serde_json::json!({"weird": true})).is_err());
        assert!(first_output_url(&serde_json::json!([])).is_err());
    }
}
