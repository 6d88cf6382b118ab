//! In-memory vector store: brute-force cosine search over embedded chunks.
pub mod memory;
pub mod similarity;

use thiserror::Error;

use crate::document::Document;
use crate::embedder::EmbedderError;

pub use memory::{MemoryVectorStore, MmrOptions};

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error("got {vectors} vectors for {documents} documents")]
    LengthMismatch { vectors: usize, documents: usize },

    #[error("vector has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Predicate restricting which stored documents a search may return.
pub type DocumentFilter<'a> = &'a (dyn Fn(&Document) -> bool + Send + Sync);
