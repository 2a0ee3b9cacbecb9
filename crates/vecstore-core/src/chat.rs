//! Chat-completion trait and message type.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One message in a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model or deployment name.
    fn model_name(&self) -> &str;

    /// Return the assistant reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Single-turn convenience: send `prompt` as one user message.
    async fn predict(&self, prompt: &str) -> Result<String> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }
}
