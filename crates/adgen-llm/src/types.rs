use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Chat-completion backends the dispatcher can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Claude,
    OpenAi,
    Blitzkong,
    Groq,
    Gemini,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Claude => "claude",
            Service::OpenAi => "openai",
            Service::Blitzkong => "blitzkong",
            Service::Groq => "groq",
            Service::Gemini => "gemini",
        }
    }

    /// Model used when the caller does not pick one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Service::Claude => "claude-3-opus-20240229",
            Service::OpenAi => "gpt-4-0125-preview",
            Service::Blitzkong => "mistral-7b-instruct-v0.1",
            Service::Groq => "llama-3.1-70b-versatile",
            Service::Gemini => "gemini-1.5-flash",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Service::Claude),
            "openai" => Ok(Service::OpenAi),
            "blitzkong" => Ok(Service::Blitzkong),
            "groq" => Ok(Service::Groq),
            "gemini" => Ok(Service::Gemini),
            other => Err(LlmError::config_error(format!(
                "Unknown LLM service: {other}"
            ))),
        }
    }
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call knobs; the defaults mirror what the pipelines expect.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub service: Service,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub json: bool,
    pub retries: u32,
    pub use_cache: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            service: Service::Groq,
            model: None,
            temperature: 0.0,
            max_tokens: None,
            json: false,
            retries: 2,
            use_cache: false,
        }
    }
}

impl CallOptions {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Model to send, falling back to the service default.
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.service.default_model().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_round_trip() {
        for service in [
            Service::Claude,
            Service::OpenAi,
            Service::Blitzkong,
            Service::Groq,
            Service::Gemini,
        ] {
            let parsed: Service = service.as_str().parse().unwrap();
            assert_eq!(parsed, service);
        }
    }

    #[test]
    fn test_service_parse_rejects_unknown() {
        assert!("palm".parse::<Service>().is_err());
    }

    #[test]
    fn test_default_options() {
        let opts = CallOptions::default();
        assert_eq!(opts.service, Service::Groq);
        assert_eq!(opts.temperature, 0.0);
        assert_eq!(opts.retries, 2);
        assert!(!opts.json);
        assert!(!opts.use_cache);
    }

    #[test]
    fn test_resolved_model_falls_back() {
        let opts = CallOptions::new(Service::Claude);
        assert_eq!(opts.resolved_model(), "claude-3-opus-20240229");

        let opts = CallOptions::new(Service::Claude).model("claude-3-5-sonnet-20240620");
        assert_eq!(opts.resolved_model(), "claude-3-5-sonnet-20240620");
    }
}
