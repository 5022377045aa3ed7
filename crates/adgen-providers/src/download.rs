//! Streaming HTTP download shared by the vendor adapters.

use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Stream `url` to `path`.
///
/// Bytes land in a `.part` staging file next to the destination and are
/// renamed into place once the stream ends, so interrupted downloads never
/// leave a truncated file under the final name. Progress is logged at
/// decile steps when the server sends a content length.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> ProviderResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::request_failed(
            "download",
            Some(status.as_u16()),
            format!("fetching to {}", path.display()),
        ));
    }

    let total = response.content_length();
    let staging = path.with_extension("part");
    let mut file = tokio::fs::File::create(&staging).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_decile: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            let decile = downloaded * 10 / total;
            if decile > last_decile {
                last_decile = decile;
                debug!(
                    path = %path.display(),
                    percent = decile * 10,
                    "Download progress"
                );
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&staging, path).await?;
    debug!(path = %path.display(), bytes = downloaded, "Download complete");
    Ok(())
}

/// MIME type from a file extension; vendors want one on every upload.
pub(crate) fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/asset.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("asset.bin");
        let client = reqwest::Client::new();
        download_to_file(&client, &format!("{}/asset.bin", server.uri()), &dest)
            .await
            .unwrap();

        let bytes = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(bytes, b"payload bytes");
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing.bin");
        let client = reqwest::Client::new();
        let err = download_to_file(&client, &format!("{}/missing.bin", server.uri()), &dest)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RequestFailed {
                status: Some(404),
                ..
            }
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.zip")), "application/zip");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }
}
