//! Mock backend for testing
//!
//! Replies are scripted per test and every call is recorded, so tests can
//! assert both what the pipeline did with a reply and what it sent.
//! Clones share the script and the call log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ChatTurn, ImageInput};

use super::AIBackend;

/// Reply returned when the script is empty
const DEFAULT_REPLY: &str =
    r#"{"doc_type": "receipt", "currency": "SEK", "summary": "mock", "transactions": []}"#;

/// A scripted reply
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Fail { status: Option<u16>, message: String },
}

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Text {
        prompt: String,
    },
    Vision {
        prompt: String,
        mime_type: String,
        bytes: usize,
    },
    Chat {
        system: String,
        turns: Vec<ChatTurn>,
    },
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockReply>,
    calls: Vec<MockCall>,
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    vision: bool,
    name: String,
    model: String,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy, vision-capable)
    pub fn new() -> Self {
        Self {
            healthy: true,
            vision: true,
            name: "mock".to_string(),
            model: "mock".to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// A text-only mock (vision calls fail like a text-only provider)
    pub fn text_only() -> Self {
        Self {
            vision: false,
            ..Self::new()
        }
    }

    /// Rename the provider (to tell two mocks apart behind a router)
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Queue a text reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(MockReply::Text(text.into()));
        self
    }

    /// Queue a provider failure
    pub fn fail(self, status: Option<u16>, message: &str) -> Self {
        self.push(MockReply::Fail {
            status,
            message: message.to_string(),
        });
        self
    }

    /// Queue a reply on an existing (possibly shared) mock
    pub fn push(&self, reply: MockReply) {
        self.lock().script.push_back(reply);
    }

    /// Everything this mock (and its clones) has been asked
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond(&self, call: MockCall) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.script.pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail { status, message }) => Err(Error::ProviderRequest {
                provider: self.name.clone(),
                status,
                message,
            }),
            None => Ok(DEFAULT_REPLY.to_string()),
        }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.respond(MockCall::Text {
            prompt: prompt.to_string(),
        })
    }

    async fn complete_vision(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        if !self.vision {
            return Err(Error::Unsupported(format!(
                "{} does not accept images",
                self.name
            )));
        }
        self.respond(MockCall::Vision {
            prompt: prompt.to_string(),
            mime_type: image.mime_type.clone(),
            bytes: image.data.len(),
        })
    }

    async fn complete_chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String> {
        self.respond(MockCall::Chat {
            system: system.to_string(),
            turns: turns.to_vec(),
        })
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn provider(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mock = MockBackend::new().reply("first").reply("second");
        assert_eq!(mock.complete_text("a").await.unwrap(), "first");
        assert_eq!(mock.complete_text("b").await.unwrap(), "second");
        assert_eq!(mock.complete_text("c").await.unwrap(), DEFAULT_REPLY);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mock = MockBackend::new().named("groq").fail(Some(503), "overloaded");
        let err = mock.complete_text("a").await.unwrap_err();
        match err {
            Error::ProviderRequest {
                provider, status, ..
            } => {
                assert_eq!(provider, "groq");
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_clones_share_log() {
        let mock = MockBackend::new();
        let clone = mock.clone();
        clone
            .complete_chat("sys", &[ChatTurn::user("hi")])
            .await
            .unwrap();
        assert_eq!(
            mock.calls(),
            vec![MockCall::Chat {
                system: "sys".to_string(),
                turns: vec![ChatTurn::user("hi")],
            }]
        );
    }

    #[tokio::test]
    async fn test_text_only_rejects_images() {
        let mock = MockBackend::text_only();
        let image = ImageInput::from_bytes(vec![1, 2, 3]);
        let err = mock.complete_vision("x", &image).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy() {
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
