//! Answer prompt template.
//!
//! A template is a small TOML document with a system prompt, a user prompt
//! containing `{{raw_text_content}}` and `{{user_query}}` placeholders, and a
//! cap on how much of the article is sent to the model.

use std::path::Path;

use kbanswer_shared::{KbAnswerError, Result};
use serde::Deserialize;

/// Template compiled into the binary, used when no prompt file is configured.
const BUILTIN_TEMPLATE: &str = include_str!("../prompts/generate_answer.toml");

/// Article characters sent to the model when the template does not say.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 120_000;

const DOCUMENT_PLACEHOLDER: &str = "{{raw_text_content}}";
const QUERY_PLACEHOLDER: &str = "{{user_query}}";

#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt_template: String,
    /// Zero means "use the default".
    #[serde(default)]
    pub max_context_chars: usize,
}

/// Prompts ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    /// The built-in template.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_TEMPLATE, "builtin prompt")
    }

    /// Load a template from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(KbAnswerError::config(format!(
                "prompt not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| KbAnswerError::io(path, e))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// The file at `path` when given, otherwise the built-in template.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    fn parse(content: &str, origin: &str) -> Result<Self> {
        let template: Self = toml::from_str(content)
            .map_err(|e| KbAnswerError::config(format!("invalid prompt {origin}: {e}")))?;
        if template.user_prompt_template.trim().is_empty() {
            return Err(KbAnswerError::config(format!(
                "invalid prompt {origin}: user_prompt_template is empty"
            )));
        }
        Ok(template)
    }

    pub fn max_context_chars(&self) -> usize {
        match self.max_context_chars {
            0 => DEFAULT_MAX_CONTEXT_CHARS,
            n => n,
        }
    }

    /// Fill the placeholders. The article is cut to `max_context_chars`
    /// characters and substituted before the question, so placeholder text
    /// inside the question is left alone.
    pub fn render(&self, document: &str, user_query: &str) -> RenderedPrompt {
        let limit = self.max_context_chars();
        let document: String = match document.char_indices().nth(limit) {
            Some((cut, _)) => document[..cut].to_string(),
            None => document.to_string(),
        };

        let user = self
            .user_prompt_template
            .trim()
            .replace(DOCUMENT_PLACEHOLDER, &document)
            .replace(QUERY_PLACEHOLDER, user_query.trim());

        RenderedPrompt {
            system: self.system_prompt.trim().to_string(),
            user,
        }
    }
}
