//! Provider selection
//!
//! Two slots: a fast text-only provider and a vision-capable provider.
//! Text and chat go to the fast provider when present, else to the vision
//! provider. Image calls need the vision provider. A router with neither
//! cannot be built.

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{ChatTurn, ImageInput};
use crate::settings::{Credentials, Settings, GEMINI_API_KEY_ENV, GROQ_API_KEY_ENV};

use super::{AIBackend, AIClient};

/// Health/identity of one configured provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// "text" or "vision"
    pub role: &'static str,
    pub provider: String,
    pub model: String,
    pub host: String,
    pub healthy: bool,
}

/// Routes each call to a provider
#[derive(Clone)]
pub struct ProviderRouter {
    /// Fast provider, or the vision provider when no fast one is configured
    primary: AIClient,
    has_fast: bool,
    vision: Option<AIClient>,
}

impl ProviderRouter {
    /// Build a router from explicit providers
    ///
    /// Fails when both slots are empty.
    pub fn new(text: Option<AIClient>, vision: Option<AIClient>) -> Result<Self> {
        let has_fast = text.is_some();
        let primary = text.or_else(|| vision.clone()).ok_or_else(|| {
            Error::Configuration(format!(
                "No AI provider configured: set {} or {}",
                GROQ_API_KEY_ENV, GEMINI_API_KEY_ENV
            ))
        })?;
        Ok(Self {
            primary,
            has_fast,
            vision,
        })
    }

    /// Build the Groq/Gemini pair from settings and whichever keys are present
    pub fn from_settings(settings: &Settings, credentials: &Credentials) -> Result<Self> {
        let text = credentials
            .groq_api_key
            .as_deref()
            .map(|key| AIClient::groq(&settings.text_provider, key));
        let vision = credentials
            .gemini_api_key
            .as_deref()
            .map(|key| AIClient::gemini(&settings.vision_provider, key));

        let router = Self::new(text, vision)?;
        info!(
            "AI providers: text={} vision={}",
            router.text_provider().provider(),
            router
                .vision
                .as_ref()
                .map(|v| v.provider())
                .unwrap_or("none")
        );
        Ok(router)
    }

    /// Provider used for text and chat calls
    pub fn text_provider(&self) -> &AIClient {
        &self.primary
    }

    /// Provider used for image calls
    pub fn vision_provider(&self) -> Result<&AIClient> {
        self.vision.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "Image extraction needs a vision provider: set {}",
                GEMINI_API_KEY_ENV
            ))
        })
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    pub async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.text_provider().complete_text(prompt).await
    }

    pub async fn complete_vision(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        self.vision_provider()?.complete_vision(prompt, image).await
    }

    pub async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        self.text_provider().complete_chat(system, turns).await
    }

    /// Identity and reachability of each configured provider
    pub async fn status(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::new();
        let fast = self.has_fast.then_some(&self.primary);
        for (role, client) in [("text", fast), ("vision", self.vision.as_ref())] {
            if let Some(client) = client {
                statuses.push(ProviderStatus {
                    role,
                    provider: client.provider().to_string(),
                    model: client.model().to_string(),
                    host: client.host().to_string(),
                    healthy: client.health_check().await,
                });
            }
        }
        statuses
    }
}
