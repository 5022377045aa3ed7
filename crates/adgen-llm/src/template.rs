//! Prompt templates with `{placeholder}` substitution.

use std::path::Path;

use crate::error::LlmResult;

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> LlmResult<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self::new(text))
    }

    /// Substitute `{name}` placeholders. Placeholders without a matching
    /// variable are left as-is so partially rendered templates stay legible.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = self.text.clone();
        for (name, value) in vars {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}
