//! Minimal text-generation client for Anthropic and OpenAI.
//!
//! This crate provides a focused client layer for single-turn completions:
//! - `Claude` for the Anthropic Messages API
//! - `OpenAi` for the OpenAI Chat Completions API
//! - `Retrying`, a wrapper that retries transient failures with backoff
//! - `OpenAiEmbeddings` for the embeddings endpoint

mod anthropic;
mod embeddings;
mod openai;
mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use anthropic::Claude;
pub use embeddings::OpenAiEmbeddings;
pub use openai::OpenAi;
pub use retry::Retrying;

/// Default request timeout for completion calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur when talking to a model provider.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured (set {0})")]
    NoApiKey(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Provider returned no text")]
    EmptyResponse,
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::EmptyResponse => true,
            Error::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::NoApiKey(_) | Error::Parse(_) | Error::Config(_) => false,
        }
    }
}

/// Which hosted provider backs a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    #[serde(alias = "open_ai")]
    OpenAi,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Defaults applied when a request leaves a sampling option unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Defaults {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.8,
        }
    }
}

/// A single-turn generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl GenerationRequest {
    /// Create a request with the given user prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Resolve unset sampling options against client defaults.
    pub(crate) fn resolve(&self, defaults: &Defaults) -> (f32, usize) {
        (
            self.temperature.unwrap_or(defaults.temperature),
            self.max_tokens.unwrap_or(defaults.max_tokens),
        )
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the request and return its text.
    async fn generate(&self, request: GenerationRequest) -> Result<String, Error>;

    /// The provider behind this client.
    fn provider(&self) -> Provider;

    /// The model requests are sent to.
    fn model(&self) -> &str;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    async fn generate(&self, request: GenerationRequest) -> Result<String, Error> {
        (**self).generate(request).await
    }

    fn provider(&self) -> Provider {
        (**self).provider()
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Build an HTTP client with the given request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-success HTTP response into an `Error::Api`.
pub(crate) async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Error::Api { status, message }
}

/// Extract JSON from a response that might be wrapped in a Markdown code block.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let after_fence = start + 3;
        // Skip an info string such as ```javascript
        let content_start = text[after_fence..]
            .find('\n')
            .map(|nl| after_fence + nl + 1)
            .unwrap_or(after_fence);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Fall back to the outermost object if the model added prose around it
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}

/// Rough token estimate: about four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("Hello")
            .with_system("You are a storyteller")
            .with_max_tokens(1000)
            .with_temperature(0.7);

        assert_eq!(request.max_tokens, Some(1000));
        assert!(request.system.is_some());
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_request_resolves_defaults() {
        let defaults = Defaults {
            max_tokens: 2048,
            temperature: 0.5,
        };
        assert_eq!(GenerationRequest::new("x").resolve(&defaults), (0.5, 2048));
        assert_eq!(
            GenerationRequest::new("x")
                .with_temperature(0.9)
                .resolve(&defaults),
            (0.9, 2048)
        );
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"title": "Arrival"}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_markdown() {
        let text = "```json\n{\"title\": \"Arrival\"}\n```";
        assert_eq!(extract_json(text), r#"{"title": "Arrival"}"#);
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "```\n{\"scenes\": []}\n```";
        assert_eq!(extract_json(text), r#"{"scenes": []}"#);
    }

    #[test]
    fn test_extract_json_surrounding_prose() {
        let text = "Here is the outline:\n{\"title\": \"Storm\"}\nEnjoy!";
        assert_eq!(extract_json(text), r#"{"title": "Storm"}"#);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Api {
            status: 529,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(Error::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!Error::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!Error::NoApiKey("ANTHROPIC_API_KEY").is_retryable());
    }

    #[test]
    fn test_provider_serde() {
        let provider: Provider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(provider, Provider::OpenAi);
        assert_eq!(Provider::Anthropic.api_key_var(), "ANTHROPIC_API_KEY");
        assert_eq!(Provider::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
