/// Chat model abstraction.
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::openai::ApiError;

pub use openai::OpenAiChat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid chat response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Send the conversation and return the assistant's reply.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;
}
