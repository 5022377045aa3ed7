//! Imgur adapter: anonymous image hosting for vendors that want a plain
//! public URL.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{truncate_body, ProviderError, ProviderResult};

const PROVIDER: &str = "imgur";
const DEFAULT_BASE_URL: &str = "https://api.imgur.com";

const VERIFY_MAX_ATTEMPTS: u32 = 10;
const VERIFY_RETRY_SECS: u64 = 2;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A hosted image link, possibly still propagating through Imgur's CDN.
#[derive(Debug, Clone)]
pub struct ImgurLink {
    pub url: String,
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    link: String,
}

pub struct ImgurClient {
    http: reqwest::Client,
    client_id: String,
    base_url: String,
}

impl ImgurClient {
    pub fn new(client_id: impl Into<String>) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        let client_id = std::env::var("IMGUR_CLIENT_ID")
            .map_err(|_| ProviderError::config_error("IMGUR_CLIENT_ID not set"))?;
        Self::new(client_id)
    }

    /// Override the API endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Upload an image anonymously; returns the page-style link.
    pub async fn upload(&self, path: &Path) -> ProviderResult<String> {
        if !path.is_file() {
            return Err(ProviderError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("image", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/3/image", self.base_url))
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .multipart(form)
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

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e.to_string()))?;
        let link = rewrite_link(&upload.data.link);
        info!(link, "Uploaded image to Imgur");
        Ok(link)
    }

    /// Check that a freshly uploaded link resolves.
    ///
    /// Imgur links can lag a few seconds behind the upload. HTTP 429 means
    /// we are being throttled; hand the unverified link back instead of
    /// burning more requests.
    pub async fn verify(&self, url: &str) -> ImgurLink {
        for attempt in 1..=VERIFY_MAX_ATTEMPTS {
            match self.http.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(url, attempt, "Imgur link verified");
                        return ImgurLink {
                            url: response.url().to_string(),
                            verified: true,
                        };
                    }
                    if status.as_u16() == 429 {
                        warn!(url, "Imgur rate limit hit, returning unverified link");
                        return ImgurLink {
                            url: url.to_string(),
                            verified: false,
                        };
                    }
                    debug!(url, attempt, status = status.as_u16(), "Imgur link not ready");
                }
                Err(e) => debug!(url, attempt, error = %e, "Imgur verification attempt failed"),
            }
            tokio::time::sleep(Duration::from_secs(VERIFY_RETRY_SECS)).await;
        }
        warn!(url, "Imgur link never verified, returning it anyway");
        ImgurLink {
            url: url.to_string(),
            verified: false,
        }
    }

    pub async fn upload_verified(&self, path: &Path) -> ProviderResult<ImgurLink> {
        let link = self.upload(path).await?;
        Ok(self.verify(&link).await)
    }
}

/// Rewrite a direct-image link (`i.imgur.com/<id>.<ext>`) to the page
/// form (`imgur.com/<id>`), which downstream vendors accept more readily.
fn rewrite_link(link: &str) -> String {
    let id = link
        .rsplit('/')
        .next()
        .and_then(|last| last.split('.').next())
        .unwrap_or(link);
    format!("https://imgur.com/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_rewrite_link() {
        assert_eq!(
            rewrite_link("https://i.imgur.com/Xy123.png"),
            "https://imgur.com/Xy123"
        );
        assert_eq!(
            rewrite_link("https://i.imgur.com/abc.jpeg"),
            "https://imgur.com/abc"
        );
    }

    #[tokio::test]
    async fn test_upload_rewrites_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/3/image"))
            .and(header("authorization", "Client-ID test-client-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"link": "https://i.imgur.com/Xy123.png"},
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = dir.path().join("shot.png");
        tokio::fs::write(&image, b"png").await.unwrap();

        let client = ImgurClient::new("test-client-id")
            .unwrap()
            .with_base_url(server.uri());
        let link = client.upload(&image).await.unwrap();
        assert_eq!(link, "https://imgur.com/Xy123");
    }

    #[tokio::test]
    async fn test_verify_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/Xy123"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ImgurClient::new("id").unwrap();
        let link = client.verify(&format!("{}/Xy123", server.uri())).await;
        assert!(link.verified);
    }

    #[tokio::test]
    async fn test_verify_rate_limited_returns_unverified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/Xy123"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let client = ImgurClient::new("id").unwrap();
        let url = format!("{}/Xy123", server.uri());
        let link = client.verify(&url).await;
        assert!(!link.verified);
        assert_eq!(link.url, url);
    }
}
