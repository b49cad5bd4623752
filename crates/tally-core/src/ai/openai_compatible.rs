//! OpenAI-compatible backend implementation
//!
//! Talks to any server that implements the OpenAI chat completions API. The
//! default configuration points at Groq (`https://api.groq.com/openai`),
//! which is fast and text-only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ChatRole, ChatTurn, ImageInput};
use crate::settings::ProviderSettings;

use super::{AIBackend, CHAT_TEMPERATURE, EXTRACTION_TEMPERATURE};

/// OpenAI-compatible backend
///
/// Sends native system/user/assistant messages to `/v1/chat/completions`
/// with bearer authentication.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    provider: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend without authentication
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            provider: "openai_compatible".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Groq endpoint from provider settings
    pub fn groq(settings: &ProviderSettings, api_key: &str) -> Self {
        Self {
            provider: "groq".to_string(),
            timeout: settings.timeout,
            ..Self::with_api_key(&settings.base_url, &settings.model, api_key)
        }
    }

    /// Make a chat completion request
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(temperature),
            max_tokens: None,
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| Error::provider(&self.provider, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderRequest {
                provider: self.provider.clone(),
                status: Some(status.as_u16()),
                message: truncate_body(&body),
            });
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(&self.provider, e))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::ProviderRequest {
                provider: self.provider.clone(),
                status: None,
                message: "empty response".into(),
            })?;

        debug!("{} response: {}", self.provider, content);
        Ok(content)
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() > 300 {
        format!("{}...", body.chars().take(300).collect::<String>())
    } else {
        body.to_string()
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user",
            content: content.to_string(),
        }
    }

    fn from_turn(turn: &ChatTurn) -> Self {
        Self {
            role: match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: turn.text.clone(),
        }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.chat_completion(vec![ChatMessage::user(prompt)], EXTRACTION_TEMPERATURE)
            .await
    }

    async fn complete_vision(&self, _prompt: &str, _image: &ImageInput) -> Result<String> {
        Err(Error::Unsupported(format!(
            "{} ({}) does not accept images",
            self.provider, self.model
        )))
    }

    async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(turns.iter().map(ChatMessage::from_turn));
        self.chat_completion(messages, CHAT_TEMPERATURE).await
    }

    fn supports_vision(&self) -> bool {
        false
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(self.timeout);
        if let Some(ref api_key) = self.api_key {
            req = req.bearer_auth(api_key);
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_backend() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8080/", "llama3.2");
        assert_eq!(backend.base_url, "http://localhost:8080");
        assert_eq!(backend.model, "llama3.2");
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn test_groq_from_settings() {
        let backend = OpenAICompatibleBackend::groq(&ProviderSettings::groq_default(), "gsk-1");
        assert_eq!(backend.provider(), "groq");
        assert_eq!(backend.host(), "https://api.groq.com/openai");
        assert_eq!(backend.api_key.as_deref(), Some("gsk-1"));
        assert_eq!(backend.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatCompletionRequest {
            model: "llama-3.3-70b-versatile".to_string(),
            messages: vec![
                ChatMessage::system("be helpful"),
                ChatMessage::from_turn(&ChatTurn::assistant("hi")),
                ChatMessage::user("Hello"),
            ],
            temperature: Some(0.7),
            max_tokens: None,
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["messages"][2]["content"], "Hello");
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_response_null_content() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_vision_unsupported() {
        let backend = OpenAICompatibleBackend::groq(&ProviderSettings::groq_default(), "k");
        let image = ImageInput::from_bytes(vec![0xFF, 0xD8, 0xFF]);
        let err = backend.complete_vision("x", &image).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let t = truncate_body(&long);
        assert_eq!(t.len(), 303);
        assert_eq!(truncate_body("short"), "short");
    }
}
