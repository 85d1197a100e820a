// Language model module
// Chat turns and the completion backend used to write answers

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use gemini::GeminiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Produces the next assistant message for a conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String>;

    /// Single-turn convenience wrapper
    async fn complete_prompt(&self, prompt: &str) -> Result<String> {
        self.complete(&[ChatTurn::user(prompt)]).await
    }
}
