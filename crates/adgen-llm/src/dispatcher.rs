//! Chat-completion dispatch across Claude, OpenAI, Blitzkong, Groq, and
//! Gemini.
//!
//! One `Dispatcher` owns the HTTP client, the per-service credentials, and
//! the disk cache. Callers pick a service through [`CallOptions`] and get
//! back plain text or extracted JSON; transient failures are retried
//! immediately up to the configured attempt count.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use adgen_models::session_timestamp;

use crate::cache::{cache_key, ResponseCache, DEFAULT_CACHE_DIR};
use crate::error::{LlmError, LlmResult};
use crate::extract::extract_json;
use crate::types::{CallOptions, ChatMessage, Service};

pub const DEFAULT_BAD_JSON_DIR: &str = "bad_json";

/// Model used for session naming; small and fast is the point.
pub const SESSION_NAME_MODEL: &str = "llama3-8b-8192";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Credentials and directories for the dispatcher.
///
/// Keys are all optional at construction; a missing key only becomes an
/// error when the matching service is actually called.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_key: Option<String>,
    pub openai_key: Option<String>,
    pub groq_key: Option<String>,
    pub gemini_key: Option<String>,
    /// Self-hosted OpenAI-compatible endpoint, e.g. `http://gpu-box:8000`.
    pub blitzkong_host: Option<String>,
    pub cache_dir: PathBuf,
    pub bad_json_dir: PathBuf,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_key: env_opt("ANTHROPIC_API_KEY"),
            openai_key: env_opt("OPENAI_API_KEY"),
            groq_key: env_opt("GROQ_API_KEY"),
            gemini_key: env_opt("GEMINI_API_KEY"),
            blitzkong_host: env_opt("BLITZKONG_HOST"),
            cache_dir: env_opt("ADGEN_LLM_CACHE_DIR")
                .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string())
                .into(),
            bad_json_dir: env_opt("ADGEN_BAD_JSON_DIR")
                .unwrap_or_else(|| DEFAULT_BAD_JSON_DIR.to_string())
                .into(),
        }
    }
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
struct BaseUrls {
    anthropic: String,
    openai: String,
    groq: String,
    gemini: String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            anthropic: "https://api.anthropic.com".to_string(),
            openai: "https://api.openai.com/v1".to_string(),
            groq: "https://api.groq.com/openai/v1".to_string(),
            gemini: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

pub struct Dispatcher {
    http: reqwest::Client,
    config: LlmConfig,
    cache: ResponseCache,
    urls: BaseUrls,
}

impl Dispatcher {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(LlmError::Network)?;
        let cache = ResponseCache::new(&config.cache_dir);
        Ok(Self {
            http,
            config,
            cache,
            urls: BaseUrls::default(),
        })
    }

    pub fn from_env() -> LlmResult<Self> {
        Self::new(LlmConfig::from_env())
    }

    /// Override the provider endpoints, for tests and proxies.
    pub fn with_base_urls(
        mut self,
        anthropic: impl Into<String>,
        openai: impl Into<String>,
        groq: impl Into<String>,
        gemini: impl Into<String>,
    ) -> Self {
        self.urls = BaseUrls {
            anthropic: anthropic.into(),
            openai: openai.into(),
            groq: groq.into(),
            gemini: gemini.into(),
        };
        self
    }

    /// Run a chat completion and return the raw reply text.
    pub async fn call(&self, messages: &[ChatMessage], opts: &CallOptions) -> LlmResult<String> {
        if messages.is_empty() {
            return Err(LlmError::EmptyMessages);
        }
        let model = opts.resolved_model();
        let key = cache_key(opts.service, &model, messages);

        if opts.use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                return Ok(hit);
            }
        }

        let reply = self.call_with_retries(messages, &model, opts).await?;
        if opts.use_cache {
            self.cache.put(&key, &reply).await;
        }
        Ok(reply)
    }

    /// Single-prompt convenience wrapper around [`Dispatcher::call`].
    pub async fn call_prompt(&self, prompt: &str, opts: &CallOptions) -> LlmResult<String> {
        self.call(&[ChatMessage::user(prompt)], opts).await
    }

    /// Run a chat completion and extract a JSON value from the reply.
    ///
    /// Extraction failures burn a retry like network failures do, since a
    /// fresh completion often fixes a malformed reply. Replies that defeat
    /// every heuristic are saved under the bad-JSON directory for
    /// inspection. A single-element array unwraps to its element.
    pub async fn call_json(&self, messages: &[ChatMessage], opts: &CallOptions) -> LlmResult<Value> {
        if messages.is_empty() {
            return Err(LlmError::EmptyMessages);
        }
        let mut opts = opts.clone();
        opts.json = true;
        let model = opts.resolved_model();
        let key = cache_key(opts.service, &model, messages);

        if opts.use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                if let Some(value) = extract_json(&hit) {
                    return Ok(unwrap_single(value));
                }
                warn!(key, "Cached LLM reply no longer parses as JSON, refetching");
            }
        }

        let attempts = opts.retries + 1;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.dispatch(messages, &model, &opts).await {
                Ok(reply) if !reply.trim().is_empty() => match extract_json(&reply) {
                    Some(value) => {
                        if opts.use_cache {
                            self.cache.put(&key, &reply).await;
                        }
                        return Ok(unwrap_single(value));
                    }
                    None => {
                        let quarantined = self.quarantine(&reply).await;
                        warn!(
                            service = %opts.service,
                            model,
                            attempt,
                            "LLM reply contained no parseable JSON"
                        );
                        last_err = Some(LlmError::JsonExtraction { quarantined });
                    }
                },
                Ok(_) => {
                    warn!(service = %opts.service, model, attempt, "LLM returned an empty reply");
                    last_err = Some(LlmError::empty_response(opts.service.as_str()));
                }
                Err(e) => {
                    warn!(service = %opts.service, model, attempt, error = %e, "LLM call failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| LlmError::empty_response(opts.service.as_str())))
    }

    /// Single-prompt convenience wrapper around [`Dispatcher::call_json`].
    pub async fn call_prompt_json(&self, prompt: &str, opts: &CallOptions) -> LlmResult<Value> {
        self.call_json(&[ChatMessage::user(prompt)], opts).await
    }

    /// Summarize a chat into a short session title.
    pub async fn name_session(&self, chat: &str) -> LlmResult<String> {
        let prompt = format!("Given this chat, give a 2-4 word summary, nothing else:\n{chat}");
        let opts = CallOptions::new(Service::Groq).model(SESSION_NAME_MODEL);
        let reply = self.call(&[ChatMessage::user(prompt)], &opts).await?;
        Ok(reply.trim().trim_matches('"').trim().to_string())
    }

    async fn call_with_retries(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
    ) -> LlmResult<String> {
        let attempts = opts.retries + 1;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.dispatch(messages, model, opts).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    debug!(service = %opts.service, model, attempt, "LLM call succeeded");
                    return Ok(reply);
                }
                Ok(_) => {
                    warn!(service = %opts.service, model, attempt, "LLM returned an empty reply");
                    last_err = Some(LlmError::empty_response(opts.service.as_str()));
                }
                Err(e) => {
                    warn!(service = %opts.service, model, attempt, error = %e, "LLM call failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| LlmError::empty_response(opts.service.as_str())))
    }

    async fn dispatch(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
    ) -> LlmResult<String> {
        match opts.service {
            Service::Claude => {
                let key = require_key(&self.config.anthropic_key, "claude", "ANTHROPIC_API_KEY")?;
                self.call_claude(key, messages, model, opts).await
            }
            Service::OpenAi => {
                let key = require_key(&self.config.openai_key, "openai", "OPENAI_API_KEY")?;
                self.call_openai_compatible(
                    &self.urls.openai,
                    key,
                    "openai",
                    messages,
                    model,
                    opts,
                    opts.json,
                )
                .await
            }
            Service::Groq => {
                let key = require_key(&self.config.groq_key, "groq", "GROQ_API_KEY")?;
                self.call_openai_compatible(
                    &self.urls.groq,
                    key,
                    "groq",
                    messages,
                    model,
                    opts,
                    false,
                )
                .await
            }
            Service::Blitzkong => {
                let host =
                    require_key(&self.config.blitzkong_host, "blitzkong", "BLITZKONG_HOST")?;
                let base = format!("{}/v1", host.trim_end_matches('/'));
                // The self-hosted endpoint ignores auth but the header must be present.
                self.call_openai_compatible(&base, "NONE", "blitzkong", messages, model, opts, false)
                    .await
            }
            Service::Gemini => {
                let key = require_key(&self.config.gemini_key, "gemini", "GEMINI_API_KEY")?;
                self.call_gemini(key, messages, model, opts).await
            }
        }
    }

    async fn call_claude(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
    ) -> LlmResult<String> {
        let mut system_parts = Vec::new();
        let mut wire = Vec::new();
        for message in messages {
            if message.role == "system" {
                system_parts.push(message.content.as_str());
            } else {
                wire.push(WireMessage {
                    role: &message.role,
                    content: &message.content,
                });
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let request = ClaudeRequest {
            model,
            max_tokens: opts.max_tokens.unwrap_or(CLAUDE_DEFAULT_MAX_TOKENS),
            temperature: opts.temperature,
            messages: wire,
            system,
        };

        let url = format!("{}/v1/messages", self.urls.anthropic);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(
                "claude",
                Some(status.as_u16()),
                truncate_body(&body),
            ));
        }

        let parsed: ClaudeResponse = response.json().await?;
        Ok(parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<String>())
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_openai_compatible(
        &self,
        base: &str,
        api_key: &str,
        service: &str,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
        json_mode: bool,
    ) -> LlmResult<String> {
        let request = OpenAiRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = format!("{base}/chat/completions");
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(
                service,
                Some(status.as_u16()),
                truncate_body(&body),
            ));
        }

        let parsed: OpenAiResponse = response.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn call_gemini(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
    ) -> LlmResult<String> {
        // Gemini gets the final turn only; upstream callers fold context
        // into a single prompt for it.
        let last = messages.last().ok_or(LlmError::EmptyMessages)?;
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: &last.content,
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: opts.temperature,
                response_mime_type: opts.json.then_some("application/json"),
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.urls.gemini, model, api_key
        );
        let response = self.http.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::request_failed(
                "gemini",
                Some(status.as_u16()),
                truncate_body(&body),
            ));
        }

        let parsed: GeminiResponse = response.json().await?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }

    async fn quarantine(&self, reply: &str) -> Option<PathBuf> {
        let dir = &self.config.bad_json_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to create bad-JSON dir");
            return None;
        }
        let path = dir.join(format!("{}.txt", session_timestamp()));
        match tokio::fs::write(&path, reply).await {
            Ok(()) => {
                warn!(path = %path.display(), "Saved unparseable LLM reply");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save unparseable LLM reply");
                None
            }
        }
    }
}

fn require_key<'a>(value: &'a Option<String>, service: &str, var: &str) -> LlmResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| LlmError::missing_key(service, var))
}

fn unwrap_single(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 2000;
    if body.chars().count() > MAX_CHARS {
        let cut: String = body.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &TempDir) -> LlmConfig {
        LlmConfig {
            anthropic_key: Some("test-anthropic-key".to_string()),
            openai_key: Some("test-openai-key".to_string()),
            groq_key: Some("test-groq-key".to_string()),
            gemini_key: Some("test-gemini-key".to_string()),
            blitzkong_host: None,
            cache_dir: dir.path().join("cache"),
            bad_json_dir: dir.path().join("bad_json"),
        }
    }

    fn dispatcher_for(server: &MockServer, config: LlmConfig) -> Dispatcher {
        Dispatcher::new(config).unwrap().with_base_urls(
            server.uri(),
            server.uri(),
            server.uri(),
            server.uri(),
        )
    }

    fn openai_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(test_config(&dir)).unwrap();
        let err = dispatcher
            .call(&[], &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyMessages));
    }

    #[tokio::test]
    async fn test_missing_key_surfaces_var_name() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.groq_key = None;
        let dispatcher = Dispatcher::new(config).unwrap();

        let err = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Groq).retries(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[tokio::test]
    async fn test_groq_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-groq-key"))
            .respond_with(openai_reply("a groq reply"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let reply = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Groq))
            .await
            .unwrap();
        assert_eq!(reply, "a groq reply");
    }

    #[tokio::test]
    async fn test_openai_json_mode_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                json!({"response_format": {"type": "json_object"}}),
            ))
            .respond_with(openai_reply("{\"ok\": true}"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let value = dispatcher
            .call_prompt_json("give me json", &CallOptions::new(Service::OpenAi))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_claude_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-anthropic-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"max_tokens": 4096})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "claude says hi"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let reply = dispatcher
            .call(
                &[
                    ChatMessage::system("Be brief."),
                    ChatMessage::user("say hi"),
                ],
                &CallOptions::new(Service::Claude),
            )
            .await
            .unwrap();
        assert_eq!(reply, "claude says hi");
    }

    #[tokio::test]
    async fn test_gemini_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "gemini reply"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let reply = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Gemini))
            .await
            .unwrap();
        assert_eq!(reply, "gemini reply");
    }

    #[tokio::test]
    async fn test_blitzkong_uses_host_and_placeholder_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer NONE"))
            .respond_with(openai_reply("local model reply"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.blitzkong_host = Some(server.uri());
        let dispatcher = Dispatcher::new(config).unwrap();

        let reply = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Blitzkong))
            .await
            .unwrap();
        assert_eq!(reply, "local model reply");
    }

    #[tokio::test]
    async fn test_cache_skips_second_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(openai_reply("cached once"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let opts = CallOptions::new(Service::Groq).use_cache(true);

        let first = dispatcher.call_prompt("same prompt", &opts).await.unwrap();
        let second = dispatcher.call_prompt("same prompt", &opts).await.unwrap();
        assert_eq!(first, "cached once");
        assert_eq!(second, "cached once");
    }

    #[tokio::test]
    async fn test_retry_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(openai_reply("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let reply = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Groq))
            .await
            .unwrap();
        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let err = dispatcher
            .call_prompt("hi", &CallOptions::new(Service::Groq))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::RequestFailed {
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_call_json_extracts_fenced_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(openai_reply("```json\n{\"scenes\": 3}\n```"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let value = dispatcher
            .call_prompt_json("plan", &CallOptions::new(Service::Groq))
            .await
            .unwrap();
        assert_eq!(value, json!({"scenes": 3}));
    }

    #[tokio::test]
    async fn test_call_json_unwraps_single_element_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(openai_reply("[{\"only\": 1}]"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let value = dispatcher
            .call_prompt_json("plan", &CallOptions::new(Service::Groq))
            .await
            .unwrap();
        assert_eq!(value, json!({"only": 1}));
    }

    #[tokio::test]
    async fn test_call_json_quarantines_unparseable_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(openai_reply("nothing structured at all"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let err = dispatcher
            .call_prompt_json("plan", &CallOptions::new(Service::Groq).retries(0))
            .await
            .unwrap_err();

        let quarantined = match err {
            LlmError::JsonExtraction { quarantined } => quarantined.unwrap(),
            other => panic!("unexpected error: {other}"),
        };
        let saved = tokio::fs::read_to_string(&quarantined).await.unwrap();
        assert_eq!(saved, "nothing structured at all");
    }

    #[tokio::test]
    async fn test_name_session_strips_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": SESSION_NAME_MODEL})))
            .respond_with(openai_reply("\"Sneaker Ad Brief\"\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher_for(&server, test_config(&dir));
        let name = dispatcher.name_session("user: make a sneaker ad").await.unwrap();
        assert_eq!(name, "Sneaker Ad Brief");
    }
}
