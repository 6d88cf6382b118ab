/// Retrievers: map a query to the documents worth showing the model.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::document::Document;
use crate::vectorstore::{MemoryVectorStore, MmrOptions, VectorStoreError};

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrieverError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Similarity,
    Mmr,
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            other => Err(format!("unknown search type {other:?} (expected similarity or mmr)")),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Similarity => f.write_str("similarity"),
            Self::Mmr => f.write_str("mmr"),
        }
    }
}

/// Retriever backed by a [`MemoryVectorStore`].
pub struct VectorStoreRetriever {
    store: Arc<MemoryVectorStore>,
    k: usize,
    search_type: SearchType,
    mmr: MmrOptions,
}

impl VectorStoreRetriever {
    pub fn new(store: Arc<MemoryVectorStore>, k: usize) -> Self {
        Self {
            store,
            k,
            search_type: SearchType::Similarity,
            mmr: MmrOptions::default(),
        }
    }

    /// Switch to MMR search with the given options.
    #[must_use]
    pub fn with_mmr(mut self, options: MmrOptions) -> Self {
        self.search_type = SearchType::Mmr;
        self.mmr = options;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }
}

#[async_trait]
impl Retriever for VectorStoreRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrieverError> {
        let docs = match self.search_type {
            SearchType::Similarity => self.store.similarity_search(query, self.k, None).await?,
            SearchType::Mmr => {
                self.store
                    .max_marginal_relevance_search(query, self.k, self.mmr, None)
                    .await?
            }
        };
        debug!("Retrieved {} documents ({} search)", docs.len(), self.search_type);
        Ok(docs)
    }
}
