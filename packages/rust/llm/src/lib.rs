//! Chat-completion client for the answer-synthesis model.
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint with one
//! system message and one user message, and reports token usage. When the
//! provider omits usage, counts are estimated from text length.

use std::time::Instant;

use kbanswer_shared::{KbAnswerError, LlmConfig, Result, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("kbanswer/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Connection and sampling settings.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmOptions {
    /// Merge the `[llm]` config section with a key read from the environment.
    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        }
    }
}

/// One generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Assistant message text.
    pub text: String,
    /// Token accounting (reported or estimated).
    pub usage: TokenUsage,
    /// Model that served the request.
    pub model: String,
    /// Wall-clock latency of the HTTP call.
    pub latency_ms: u64,
}

/// Rough token count for `text`: about four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
    auth_header: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    /// Build a client. Fails on an empty key or model name.
    pub fn new(opts: &LlmOptions) -> Result<Self> {
        if opts.api_key.trim().is_empty() {
            return Err(KbAnswerError::config("missing LLM API key"));
        }
        if opts.model.trim().is_empty() {
            return Err(KbAnswerError::config("missing LLM model name"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| KbAnswerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", opts.base_url.trim_end_matches('/')),
            auth_header: format!("Bearer {}", opts.api_key.trim()),
            model: opts.model.clone(),
            temperature: opts.temperature,
        })
    }

    /// Send a system + user prompt pair and return the first choice.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        debug!(
            endpoint = %self.endpoint,
            prompt_chars = system_prompt.len() + user_prompt.len(),
            "sending chat completion"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbAnswerError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KbAnswerError::Llm(format!(
                "HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| KbAnswerError::Llm(format!("failed to parse response: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| KbAnswerError::Llm("no choices in response".into()))?;
        let text = choice.message.content.unwrap_or_default();

        let estimated_in = estimate_tokens(&format!("{system_prompt}\n{user_prompt}"));
        let estimated_out = estimate_tokens(&text);
        let usage = match parsed.usage {
            Some(u) => TokenUsage::new(
                u.prompt_tokens.unwrap_or(estimated_in),
                u.completion_tokens.unwrap_or(estimated_out),
            ),
            None => TokenUsage::new(estimated_in, estimated_out),
        };

        info!(
            tokens_in = usage.input_tokens,
            tokens_out = usage.output_tokens,
            latency_ms,
            "chat completion received"
        );

        Ok(Completion {
            text,
            usage,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(base_url: &str) -> LlmOptions {
        LlmOptions {
            base_url: base_url.into(),
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
            temperature: 0.0,
            timeout_secs: 5,
        }
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Characters, not bytes.
        assert_eq!(estimate_tokens("ção"), 1);
    }

    #[test]
    fn rejects_empty_key() {
        let mut opts = options("http://localhost");
        opts.api_key = "  ".into();
        let err = LlmClient::new(&opts).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn options_from_config() {
        let opts = LlmOptions::from_config(&LlmConfig::default(), "sk-1");
        assert_eq!(opts.model, "gpt-4o");
        assert_eq!(opts.api_key, "sk-1");
        assert_eq!(opts.base_url, "https://api.openai.com");
    }

    #[tokio::test]
    async fn test_invoke_with_reported_usage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "Answer from the document." },
                    { "role": "user", "content": "What is MBEW?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-2024-08-06",
                "choices": [
                    { "index": 0, "message": { "role": "assistant", "content": "A table.\nRELEVANT" }, "finish_reason": "stop" }
                ],
                "usage": { "prompt_tokens": 120, "completion_tokens": 7, "total_tokens": 127 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(&options(&server.uri())).unwrap();
        let completion = client
            .invoke("Answer from the document.", "What is MBEW?")
            .await
            .unwrap();

        assert_eq!(completion.text, "A table.\nRELEVANT");
        assert_eq!(completion.usage, TokenUsage::new(120, 7));
        assert_eq!(completion.model, "gpt-4o-2024-08-06");
    }

    #[tokio::test]
    async fn test_invoke_estimates_missing_usage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [ { "message": { "content": "12345678" } } ]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&options(&server.uri())).unwrap();
        let completion = client.invoke("sys", "user").await.unwrap();

        // "sys\nuser" is 8 characters.
        assert_eq!(completion.usage.input_tokens, 2);
        assert_eq!(completion.usage.output_tokens, 2);
        assert_eq!(completion.usage.total_tokens, 4);
        assert_eq!(completion.model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_invoke_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&options(&server.uri())).unwrap();
        let err = client.invoke("sys", "user").await.unwrap_err();
        assert!(matches!(err, KbAnswerError::Llm(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_invoke_no_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let client = LlmClient::new(&options(&server.uri())).unwrap();
        let err = client.invoke("sys", "user").await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
