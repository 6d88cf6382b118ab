/// Embedder trait and shared types for text embedding.
pub mod hash;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::openai::ApiError;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow shared use
/// behind `Arc`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed multiple texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Embed a single text, typically a query.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("no embedding returned".to_string()))
    }
}
