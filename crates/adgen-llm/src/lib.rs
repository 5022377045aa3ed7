//! Multi-provider chat-completion dispatcher.
//!
//! Wraps Claude, OpenAI, Blitzkong, Groq, and Gemini behind one calling
//! surface with disk caching, immediate retries, and JSON extraction for
//! models that wrap their structured output in prose.

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod template;
pub mod types;

pub use cache::{cache_key, ResponseCache};
pub use dispatcher::{Dispatcher, LlmConfig, SESSION_NAME_MODEL};
pub use error::{LlmError, LlmResult};
pub use extract::extract_json;
pub use template::PromptTemplate;
pub use types::{CallOptions, ChatMessage, Service};
