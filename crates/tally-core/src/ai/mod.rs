//! Pluggable AI provider abstraction
//!
//! This module provides a provider-agnostic interface for the three kinds of
//! model call the pipeline makes: plain text completion, completion over one
//! image, and chat with a system text and prior turns.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all providers
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend` (Groq),
//!   `GeminiBackend`, `MockBackend`
//! - `ProviderRouter`: picks a provider per call (fast text first, vision
//!   provider as fallback) and refuses to exist without credentials
//!
//! # Usage
//!
//! ```rust,ignore
//! let router = ProviderRouter::from_settings(&settings, &Credentials::from_env())?;
//! let reply = router.complete_text("Extract transactions ...").await?;
//! let record = parsing::sanitize_value(&reply)?;
//! ```

mod gemini;
mod mock;
mod openai_compatible;
pub mod parsing;
mod router;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockCall, MockReply};
pub use openai_compatible::OpenAICompatibleBackend;
pub use router::{ProviderRouter, ProviderStatus};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatRole, ChatTurn, ImageInput};
use crate::settings::ProviderSettings;

/// Sampling temperature for structured extraction
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;
/// Sampling temperature for conversational answers
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Trait defining the interface for all AI providers
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Complete a single text prompt
    async fn complete_text(&self, prompt: &str) -> Result<String>;

    /// Complete a prompt over one image
    async fn complete_vision(&self, prompt: &str, image: &ImageInput) -> Result<String>;

    /// Answer the last turn given a system text and the conversation so far
    async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String>;

    /// Whether `complete_vision` is offered
    fn supports_vision(&self) -> bool;

    /// Check if the provider is reachable with the configured credentials
    async fn health_check(&self) -> bool;

    /// Provider name (for logging and errors)
    fn provider(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat completions (Groq)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Google Gemini generateContent
    Gemini(GeminiBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Fast text provider from settings
    pub fn groq(settings: &ProviderSettings, api_key: &str) -> Self {
        AIClient::OpenAICompatible(OpenAICompatibleBackend::groq(settings, api_key))
    }

    /// Vision provider from settings
    pub fn gemini(settings: &ProviderSettings, api_key: &str) -> Self {
        AIClient::Gemini(GeminiBackend::from_settings(settings, api_key))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete_text(prompt).await,
            AIClient::Gemini(b) => b.complete_text(prompt).await,
            AIClient::Mock(b) => b.complete_text(prompt).await,
        }
    }

    async fn complete_vision(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete_vision(prompt, image).await,
            AIClient::Gemini(b) => b.complete_vision(prompt, image).await,
            AIClient::Mock(b) => b.complete_vision(prompt, image).await,
        }
    }

    async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete_chat(system, turns).await,
            AIClient::Gemini(b) => b.complete_chat(system, turns).await,
            AIClient::Mock(b) => b.complete_chat(system, turns).await,
        }
    }

    fn supports_vision(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.supports_vision(),
            AIClient::Gemini(b) => b.supports_vision(),
            AIClient::Mock(b) => b.supports_vision(),
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Gemini(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn provider(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.provider(),
            AIClient::Gemini(b) => b.provider(),
            AIClient::Mock(b) => b.provider(),
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Gemini(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Gemini(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Flatten a chat into one prompt for single-input providers
///
/// The system text comes first, then each turn as `User: ...` or
/// `Assistant: ...`, separated by blank lines.
pub fn flatten_chat(system: &str, turns: &[ChatTurn]) -> String {
    let mut parts = Vec::with_capacity(turns.len() + 1);
    parts.push(system.to_string());
    for turn in turns {
        let speaker = match turn.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        parts.push(format!("{}: {}", speaker, turn.text));
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.provider(), "mock");
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AIClient::mock();
        assert!(client.health_check().await);
    }

    #[test]
    fn test_capabilities() {
        let groq = AIClient::groq(&ProviderSettings::groq_default(), "key");
        let gemini = AIClient::gemini(&ProviderSettings::gemini_default(), "key");
        assert!(!groq.supports_vision());
        assert!(gemini.supports_vision());
    }

    #[test]
    fn test_flatten_chat() {
        let turns = vec![
            ChatTurn::user("How much did I spend?"),
            ChatTurn::assistant("1200 SEK."),
            ChatTurn::user("On food?"),
        ];
        let flat = flatten_chat("SYSTEM", &turns);
        assert_eq!(
            flat,
            "SYSTEM\n\nUser: How much did I spend?\n\nAssistant: 1200 SEK.\n\nUser: On food?"
        );
    }
}
