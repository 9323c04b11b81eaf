//! OpenAI Chat Completions API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{api_error, http_client, Defaults, Error, GenerationRequest, LlmClient, Provider};

pub(crate) const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat client.
#[derive(Clone)]
pub struct OpenAi {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    defaults: Defaults,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(crate::DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            defaults: Defaults::default(),
        }
    }

    /// Create a client from the OPENAI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let var = Provider::OpenAi.api_key_var();
        let api_key = std::env::var(var).map_err(|_| Error::NoApiKey(var))?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_api_request(&self, request: &GenerationRequest) -> ChatRequest {
        let (temperature, max_tokens) = request.resolve(&self.defaults);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(request.prompt.clone()),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAi {
    async fn generate(&self, request: GenerationRequest) -> Result<String, Error> {
        let api_request = self.build_api_request(&request);
        debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            max_tokens = api_request.max_tokens,
            "Sending OpenAI request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        chat.text()
    }

    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatResponse {
    fn text(self) -> Result<String, Error> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(Error::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_comes_first() {
        let client = OpenAi::new("key");
        let api_request = client.build_api_request(
            &GenerationRequest::new("Write")
                .with_system("You are a novelist")
                .with_temperature(0.9),
        );
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[0].role, "system");
        assert_eq!(api_request.messages[1].role, "user");
        assert_eq!(api_request.temperature, 0.9);
        assert_eq!(api_request.max_tokens, Defaults::default().max_tokens);
    }

    #[test]
    fn test_no_system_message() {
        let client = OpenAi::new("key").with_model("gpt-4o-mini");
        let api_request = client.build_api_request(&GenerationRequest::new("Write"));
        assert_eq!(api_request.messages.len(), 1);
        assert_eq!(api_request.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "The ship drifted."}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().unwrap(), "The ship drifted.");
    }

    #[test]
    fn test_parse_empty_choices() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(response.text(), Err(Error::EmptyResponse)));
    }
}
