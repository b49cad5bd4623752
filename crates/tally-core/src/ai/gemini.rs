//! Google Gemini backend implementation
//!
//! Uses `models/{model}:generateContent` with the API key as a query
//! parameter. Gemini accepts inline base64 images, so this is the provider
//! the router uses for vision; it also serves text and chat when no fast
//! text provider is configured.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ChatTurn, ImageInput};
use crate::settings::ProviderSettings;

use super::openai_compatible::truncate_body;
use super::{flatten_chat, AIBackend, CHAT_TEMPERATURE, EXTRACTION_TEMPERATURE};

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_settings(settings: &ProviderSettings, api_key: &str) -> Self {
        Self {
            timeout: settings.timeout,
            ..Self::new(&settings.base_url, &settings.model, api_key)
        }
    }

    async fn generate_content(&self, parts: Vec<Part>, temperature: f32) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig { temperature },
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider("gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderRequest {
                provider: "gemini".into(),
                status: Some(status.as_u16()),
                message: truncate_body(&body),
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("gemini", e))?;

        let text: String = body
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::ProviderRequest {
                provider: "gemini".into(),
                status: None,
                message: "empty response".into(),
            });
        }

        debug!("gemini response: {}", text);
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

/// Request part: text or inline image
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl AIBackend for GeminiBackend {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.generate_content(
            vec![Part::Text {
                text: prompt.to_string(),
            }],
            EXTRACTION_TEMPERATURE,
        )
        .await
    }

    async fn complete_vision(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
        self.generate_content(
            vec![
                Part::Text {
                    text: prompt.to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: encoded,
                    },
                },
            ],
            EXTRACTION_TEMPERATURE,
        )
        .await
    }

    async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        let prompt = flatten_chat(system, turns);
        self.generate_content(vec![Part::Text { text: prompt }], CHAT_TEMPERATURE)
            .await
    }

    fn supports_vision(&self) -> bool {
        true
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models/{}", self.base_url, self.model);
        match self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
