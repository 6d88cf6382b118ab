//! Retrieval QA chain: retrieve chunks for a query, stuff them into a prompt,
//! and ask the chat model.
pub mod prompt;
pub mod retrieval_qa;

use serde::Serialize;
use thiserror::Error;

use crate::document::Document;
use crate::llm::ChatError;
use crate::retriever::RetrieverError;

pub use retrieval_qa::RetrievalQaChain;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrieverError),

    #[error("language model failed: {0}")]
    Llm(#[from] ChatError),
}

/// Result of a chain call; serialises as `{"text": ...}` plus
/// `source_documents` when requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainOutput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<Document>>,
}
