//! Artifact delivery.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use tracing::debug;

use adgen_storage::content_type_for;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::validate_workspace_path;
use crate::state::AppState;

/// `GET /api/artifacts/{*path}` — serve a file from the data volume.
///
/// Paths are data-root relative; traversal attempts are rejected before
/// the filesystem is touched.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<impl IntoResponse> {
    validate_workspace_path(&path, "artifact path")?;

    let resolved = state.sessions.resolve_artifact(&path).await?;
    if !resolved.is_file() {
        return Err(ApiError::not_found(path));
    }

    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read artifact: {e}")))?;
    metrics::record_artifact_served(bytes.len() as u64);

    let file_name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    debug!(path = %resolved.display(), bytes = bytes.len(), "Serving artifact");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&resolved)),
    );
    if let Ok(disposition) = HeaderValue::from_str(&format!("inline; filename=\"{file_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((headers, bytes))
}
