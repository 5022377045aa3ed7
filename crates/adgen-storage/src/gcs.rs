//! Google Cloud Storage delivery.
//!
//! Uploads finished artifacts with the JSON API media upload and produces V4
//! signed URLs without a local private key: the string-to-sign is signed by
//! the IAM credentials `signBlob` endpoint under the configured service
//! account, so the same code works on workstations and on GCE metadata
//! credentials.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::token_cache::{TokenCache, STORAGE_SCOPES};

/// Default signed URL lifetime (24 hours, the GCS maximum is 7 days).
const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 24 * 60 * 60;

/// Configuration for the GCS client.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket receiving uploads
    pub bucket: String,
    /// Service account email used for `signBlob` delegation
    pub signer_email: String,
    /// Signed URL lifetime in seconds
    pub signed_url_ttl_secs: u64,
}

impl GcsConfig {
    /// Create config from environment variables.
    ///
    /// The signer email comes from `ADGEN_GCS_SIGNER_EMAIL`, falling back to
    /// the `client_email` of the service account file named by
    /// `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_env() -> StorageResult<Self> {
        let bucket = std::env::var("ADGEN_GCS_BUCKET")
            .map_err(|_| StorageError::config_error("ADGEN_GCS_BUCKET not set"))?;

        let signer_email = match std::env::var("ADGEN_GCS_SIGNER_EMAIL") {
            Ok(email) if !email.is_empty() => email,
            _ => signer_email_from_credentials()?,
        };

        let signed_url_ttl_secs = std::env::var("ADGEN_SIGNED_URL_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SIGNED_URL_TTL_SECS);

        Ok(Self {
            bucket,
            signer_email,
            signed_url_ttl_secs,
        })
    }
}

/// Read the signer email out of the service account JSON file.
fn signer_email_from_credentials() -> StorageResult<String> {
    #[derive(Deserialize)]
    struct CredentialsFile {
        client_email: String,
    }

    let path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").map_err(|_| {
        StorageError::config_error(
            "Set ADGEN_GCS_SIGNER_EMAIL or GOOGLE_APPLICATION_CREDENTIALS to determine \
             the signing service account",
        )
    })?;

    let raw = std::fs::read_to_string(&path)?;
    let creds: CredentialsFile = serde_json::from_str(&raw)?;
    Ok(creds.client_email)
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    signed_blob: String,
}

/// Google Cloud Storage client.
pub struct GcsClient {
    http: Client,
    config: GcsConfig,
    token_cache: Arc<TokenCache>,
    storage_base: String,
    iam_base: String,
}

impl Clone for GcsClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            token_cache: Arc::clone(&self.token_cache),
            storage_base: self.storage_base.clone(),
            iam_base: self.iam_base.clone(),
        }
    }
}

impl GcsClient {
    /// Create a new client from configuration.
    pub fn new(config: GcsConfig) -> StorageResult<Self> {
        let auth = create_auth_provider()?;

        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("adgen-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StorageError::Network)?;

        Ok(Self {
            http,
            config,
            token_cache: Arc::new(TokenCache::new(auth, STORAGE_SCOPES)),
            storage_base: "https://storage.googleapis.com".to_string(),
            iam_base: "https://iamcredentials.googleapis.com".to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(GcsConfig::from_env()?)
    }

    /// Override endpoints, for tests and local emulators.
    pub fn with_base_urls(
        mut self,
        storage: impl Into<String>,
        iam: impl Into<String>,
    ) -> Self {
        self.storage_base = storage.into();
        self.iam_base = iam.into();
        self
    }

    /// The configured bucket.
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Upload a local file, keyed by its base name.
    ///
    /// Returns the object name in the bucket.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> StorageResult<String> {
        let path = path.as_ref();
        let object = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::config_error("upload path has no file name"))?
            .to_string();

        let data = tokio::fs::read(path).await?;
        let content_type = content_type_for(path);
        debug!(
            object = %object,
            bytes = data.len(),
            "Uploading to gs://{}",
            self.config.bucket
        );

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.storage_base,
            self.config.bucket,
            urlencoding::encode(&object)
        );

        let mut token = self.token_cache.get_token().await?;
        let mut response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("content-type", content_type)
            .body(data.clone())
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.token_cache.invalidate().await;
            token = self.token_cache.get_token().await?;
            response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("content-type", content_type)
                .body(data)
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(status.as_u16(), body));
        }

        let metadata: ObjectMetadata = response.json().await?;
        info!(
            object = %metadata.name,
            bucket = %self.config.bucket,
            "Uploaded object"
        );
        Ok(metadata.name)
    }

    /// Produce a V4 signed GET URL for an object.
    pub async fn signed_url(&self, object: &str) -> StorageResult<String> {
        self.signed_url_at(object, Utc::now()).await
    }

    /// Upload a file and return a signed URL for it.
    pub async fn upload_and_sign(&self, path: impl AsRef<Path>) -> StorageResult<String> {
        let object = self.upload_file(path).await?;
        self.signed_url(&object).await
    }

    async fn signed_url_at(&self, object: &str, now: DateTime<Utc>) -> StorageResult<String> {
        let inputs = SigningInputs::new(
            &self.config.bucket,
            object,
            &self.config.signer_email,
            now,
            self.config.signed_url_ttl_secs,
        );

        let signature = self.sign_blob(inputs.string_to_sign.as_bytes()).await?;

        Ok(format!(
            "{}{}&X-Goog-Signature={}",
            self.storage_base,
            inputs.unsigned_path_and_query,
            hex::encode(signature)
        ))
    }

    /// Sign bytes with the IAM credentials `signBlob` endpoint.
    async fn sign_blob(&self, payload: &[u8]) -> StorageResult<Vec<u8>> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:signBlob",
            self.iam_base, self.config.signer_email
        );

        let token = self.token_cache.get_token().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "payload": BASE64.encode(payload) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::sign_failed(format!(
                "signBlob returned {}: {}",
                status, body
            )));
        }

        let parsed: SignBlobResponse = response.json().await?;
        BASE64
            .decode(parsed.signed_blob)
            .map_err(|e| StorageError::sign_failed(format!("invalid signature encoding: {e}")))
    }
}

fn create_auth_provider() -> StorageResult<Arc<dyn TokenProvider>> {
    let service_account = CustomServiceAccount::from_env()
        .map_err(|e| StorageError::auth_error(format!("Failed to load service account: {}", e)))?;

    match service_account {
        Some(sa) => Ok(Arc::new(sa)),
        None => Err(StorageError::auth_error(
            "GOOGLE_APPLICATION_CREDENTIALS not set. \
             Set it to the path of your service account JSON file.",
        )),
    }
}

/// Deterministic pieces of a V4 signed URL, separated from the network call
/// that produces the signature.
struct SigningInputs {
    unsigned_path_and_query: String,
    string_to_sign: String,
}

impl SigningInputs {
    fn new(
        bucket: &str,
        object: &str,
        signer_email: &str,
        now: DateTime<Utc>,
        expires_secs: u64,
    ) -> Self {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let credential_scope = format!("{date}/auto/storage/goog4_request");

        let canonical_uri = format!("/{}/{}", bucket, encode_object_path(object));

        // Query parameters in canonical (sorted) order
        let canonical_query = format!(
            "X-Goog-Algorithm=GOOG4-RSA-SHA256\
             &X-Goog-Credential={}\
             &X-Goog-Date={}\
             &X-Goog-Expires={}\
             &X-Goog-SignedHeaders=host",
            urlencoding::encode(&format!("{signer_email}/{credential_scope}")),
            timestamp,
            expires_secs,
        );

        let canonical_request = format!(
            "GET\n{}\n{}\nhost:storage.googleapis.com\n\nhost\nUNSIGNED-PAYLOAD",
            canonical_uri, canonical_query
        );

        let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "GOOG4-RSA-SHA256\n{}\n{}\n{}",
            timestamp, credential_scope, request_hash
        );

        Self {
            unsigned_path_and_query: format!("{canonical_uri}?{canonical_query}"),
            string_to_sign,
        }
    }
}

/// Percent-encode an object path, keeping `/` as a segment separator.
fn encode_object_path(object: &str) -> String {
    object
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Content type by file extension, defaulting to octet-stream.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/final.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("song.MP3")), "audio/mpeg");
        assert_eq!(
            content_type_for(Path::new("mystery.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_encode_object_path_keeps_slashes() {
        assert_eq!(
            encode_object_path("sessions/run 1/final video.mp4"),
            "sessions/run%201/final%20video.mp4"
        );
    }

    #[test]
    fn test_signing_inputs_are_deterministic() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let inputs = SigningInputs::new(
            "adgen-artifacts",
            "final_video.mp4",
            "signer@project.iam.gserviceaccount.com",
            now,
            3600,
        );

        assert!(inputs
            .unsigned_path_and_query
            .starts_with("/adgen-artifacts/final_video.mp4?X-Goog-Algorithm=GOOG4-RSA-SHA256"));
        assert!(inputs
            .unsigned_path_and_query
            .contains("X-Goog-Date=20250115T120000Z"));
        assert!(inputs.unsigned_path_and_query.contains("X-Goog-Expires=3600"));

        let lines: Vec<&str> = inputs.string_to_sign.lines().collect();
        assert_eq!(lines[0], "GOOG4-RSA-SHA256");
        assert_eq!(lines[1], "20250115T120000Z");
        assert_eq!(lines[2], "20250115/auto/storage/goog4_request");
        // SHA-256 of the canonical request
        assert_eq!(lines[3].len(), 64);
    }

    #[test]
    fn test_credential_is_percent_encoded() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let inputs = SigningInputs::new(
            "bucket",
            "o.mp4",
            "signer@project.iam.gserviceaccount.com",
            now,
            60,
        );

        assert!(inputs
            .unsigned_path_and_query
            .contains("X-Goog-Credential=signer%40project.iam.gserviceaccount.com%2F20250115"));
    }
}
