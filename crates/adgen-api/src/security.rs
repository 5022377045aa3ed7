//! Input validation for operator-supplied values.
//!
//! Prompts, trigger words, session ids, and workspace paths all end up in
//! queue payloads, directory names, or vendor requests; each gets a shape
//! check here before anything is enqueued.

use url::Url;

use adgen_models::SessionId;

use crate::error::{ApiError, ApiResult};

/// Maximum prompt length.
pub const MAX_PROMPT_LENGTH: usize = 5000;

/// Maximum trigger word length.
pub const MAX_TRIGGER_WORD_LENGTH: usize = 64;

/// Maximum number of prompts in one image-generation submission.
pub const MAX_PROMPTS_PER_JOB: usize = 20;

/// Maximum number of source images in one video-generation submission.
pub const MAX_IMAGES_PER_JOB: usize = 10;

/// Strip control characters and cap the length of free-form text.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(max_len)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Validate a generation prompt: non-empty after sanitization.
pub fn validate_prompt(prompt: &str, what: &str) -> ApiResult<String> {
    let cleaned = sanitize_text(prompt, MAX_PROMPT_LENGTH);
    if cleaned.is_empty() {
        return Err(ApiError::validation(format!("{what} must not be empty")));
    }
    Ok(cleaned)
}

/// Validate a LoRA trigger word: the token ends up in registry file names
/// and vendor payloads, so only word characters are allowed.
pub fn validate_trigger_word(word: &str) -> ApiResult<&str> {
    if word.is_empty() || word.len() > MAX_TRIGGER_WORD_LENGTH {
        return Err(ApiError::validation(format!(
            "trigger_word must be 1-{MAX_TRIGGER_WORD_LENGTH} characters"
        )));
    }
    if !word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::validation(
            "trigger_word may only contain letters, digits, and underscores",
        ));
    }
    Ok(word)
}

/// Validate an https URL (trained weights, reference images).
pub fn validate_https_url<'a>(raw: &'a str, what: &str) -> ApiResult<&'a str> {
    let parsed =
        Url::parse(raw).map_err(|_| ApiError::validation(format!("{what} is not a valid URL")))?;
    if parsed.scheme() != "https" {
        return Err(ApiError::validation(format!("{what} must be an https URL")));
    }
    Ok(raw)
}

/// Validate a data-root relative workspace path from a request body.
///
/// The storage layer canonicalizes again on resolution; this check exists
/// so bad paths are rejected before a job is enqueued.
pub fn validate_workspace_path<'a>(path: &'a str, what: &str) -> ApiResult<&'a str> {
    if path.is_empty() || path.len() > 512 {
        return Err(ApiError::validation(format!("{what} has an invalid length")));
    }
    let p = std::path::Path::new(path);
    if p.is_absolute()
        || p.components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(ApiError::validation(format!(
            "{what} must be a workspace-relative path"
        )));
    }
    Ok(path)
}

/// Validate an operator-supplied session id.
pub fn validate_session_id(raw: &str) -> ApiResult<SessionId> {
    let id = SessionId::from_string(raw);
    if !id.is_valid() {
        return Err(ApiError::validation(format!("invalid session id: {raw}")));
    }
    Ok(id)
}

/// File name safe to store an upload under: the basename of whatever the
/// client sent, with anything path-like stripped.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(128)
        .collect::<String>();
    if base.is_empty() || base.starts_with('.') {
        fallback.to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_text_strips_controls() {
        assert_eq!(sanitize_text("a\x00b\x07c", 100), "abc");
        assert_eq!(sanitize_text("  padded  ", 100), "padded");
        assert_eq!(sanitize_text("keep\nnewlines", 100), "keep\nnewlines");
    }

    #[test]
    fn test_trigger_word_rules() {
        assert!(validate_trigger_word("ACME_BAG1").is_ok());
        assert!(validate_trigger_word("").is_err());
        assert!(validate_trigger_word("bad word").is_err());
        assert!(validate_trigger_word("semi;colon").is_err());
        assert!(validate_trigger_word(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_https_url_rules() {
        assert!(validate_https_url("https://cdn.example.com/lora.safetensors", "lora_url").is_ok());
        assert!(validate_https_url("http://cdn.example.com/x", "lora_url").is_err());
        assert!(validate_https_url("file:///etc/passwd", "lora_url").is_err());
        assert!(validate_https_url("not a url", "lora_url").is_err());
    }

    #[test]
    fn test_workspace_path_rules() {
        assert!(validate_workspace_path("train_20240101_120000/upload.zip", "path").is_ok());
        assert!(validate_workspace_path("/etc/passwd", "path").is_err());
        assert!(validate_workspace_path("a/../../b", "path").is_err());
        assert!(validate_workspace_path("", "path").is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(
            sanitize_file_name("../../evil.zip", "upload.zip"),
            "evil.zip"
        );
        assert_eq!(
            sanitize_file_name("C:\\photos\\product shots.zip", "upload.zip"),
            "productshots.zip"
        );
        assert_eq!(sanitize_file_name(".hidden", "upload.zip"), "upload.zip");
        assert_eq!(sanitize_file_name("", "upload.zip"), "upload.zip");
    }
}
