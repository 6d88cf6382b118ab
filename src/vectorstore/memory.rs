use std::sync::Arc;

use tracing::debug;

use super::similarity::{cosine_similarity, maximal_marginal_relevance};
use super::{DocumentFilter, VectorStoreError};
use crate::document::Document;
use crate::embedder::Embedder;
use crate::retriever::{SearchType, VectorStoreRetriever};

/// MMR configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrOptions {
    /// Candidates fetched by plain similarity before re-ranking
    pub fetch_k: usize,
    /// 0.0 = pure diversity, 1.0 = pure relevance
    pub lambda: f32,
}

impl Default for MmrOptions {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryVector {
    document: Document,
    embedding: Vec<f32>,
}

/// Non-persistent vector store holding every embedding in a `Vec`.
pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    vectors: Vec<MemoryVector>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            vectors: Vec::new(),
        }
    }

    /// Embed `documents` and return a store holding them.
    pub async fn from_documents(
        documents: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, VectorStoreError> {
        let mut store = Self::new(embedder);
        store.add_documents(documents).await?;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality of stored vectors, once anything has been stored.
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(|v| v.embedding.len())
    }

    pub async fn add_documents(
        &mut self,
        documents: Vec<Document>,
    ) -> Result<(), VectorStoreError> {
        if documents.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        self.add_vectors(vectors, documents)
    }

    /// Store precomputed vectors; `vectors[i]` belongs to `documents[i]`.
    pub fn add_vectors(
        &mut self,
        vectors: Vec<Vec<f32>>,
        documents: Vec<Document>,
    ) -> Result<(), VectorStoreError> {
        if vectors.len() != documents.len() {
            return Err(VectorStoreError::LengthMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
            });
        }

        if let Some(expected) = self.dimensions().or_else(|| vectors.first().map(Vec::len)) {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        self.vectors.extend(
            vectors
                .into_iter()
                .zip(documents)
                .map(|(embedding, document)| MemoryVector {
                    document,
                    embedding,
                }),
        );
        debug!("Vector store now holds {} entries", self.vectors.len());
        Ok(())
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<Document>, VectorStoreError> {
        Ok(self
            .similarity_search_with_score(query, k, filter)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    /// Top `k` documents for `query` with their cosine similarity, best first.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;
        self.similarity_search_vector_with_score(&query_vector, k, filter)
    }

    pub fn similarity_search_vector_with_score(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        Ok(self
            .ranked(query, filter)?
            .into_iter()
            .take(k)
            .map(|(i, score)| (self.vectors[i].document.clone(), score))
            .collect())
    }

    /// Fetch `options.fetch_k` candidates by similarity, then pick `k` of
    /// them by Maximal Marginal Relevance.
    pub async fn max_marginal_relevance_search(
        &self,
        query: &str,
        k: usize,
        options: MmrOptions,
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<Document>, VectorStoreError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;
        self.max_marginal_relevance_search_by_vector(&query_vector, k, options, filter)
    }

    pub fn max_marginal_relevance_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        options: MmrOptions,
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<Document>, VectorStoreError> {
        let candidates: Vec<usize> = self
            .ranked(query, filter)?
            .into_iter()
            .take(options.fetch_k.max(k))
            .map(|(i, _)| i)
            .collect();
        let embeddings: Vec<&[f32]> = candidates
            .iter()
            .map(|&i| self.vectors[i].embedding.as_slice())
            .collect();

        Ok(maximal_marginal_relevance(query, &embeddings, k, options.lambda)
            .into_iter()
            .map(|picked| self.vectors[candidates[picked]].document.clone())
            .collect())
    }

    pub fn as_retriever(self: Arc<Self>, k: usize) -> VectorStoreRetriever {
        VectorStoreRetriever::new(self, k)
    }

    /// Retriever using `search_type`; `options` only matter for MMR.
    pub fn as_retriever_with(
        self: Arc<Self>,
        k: usize,
        search_type: SearchType,
        options: MmrOptions,
    ) -> VectorStoreRetriever {
        match search_type {
            SearchType::Similarity => VectorStoreRetriever::new(self, k),
            SearchType::Mmr => VectorStoreRetriever::new(self, k).with_mmr(options),
        }
    }

    /// Indices of matching entries with their score, best first.
    fn ranked(
        &self,
        query: &[f32],
        filter: Option<DocumentFilter<'_>>,
    ) -> Result<Vec<(usize, f32)>, VectorStoreError> {
        if let Some(expected) = self.dimensions() {
            if query.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(_, v)| filter.is_none_or(|f| f(&v.document)))
            .map(|(i, v)| (i, cosine_similarity(query, &v.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(*t).with_metadata("id", i))
            .collect()
    }

    fn ids(docs: &[Document]) -> Vec<u64> {
        docs.iter().map(|d| d.metadata["id"].as_u64().unwrap()).collect()
    }

    fn handcrafted() -> MemoryVectorStore {
        let mut store = MemoryVectorStore::new(Arc::new(HashEmbedder::new(3)));
        store
            .add_vectors(
                vec![
                    vec![1.0, 0.0, 0.0],
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.0, 0.0, 1.0],
                ],
                docs(&["a", "a copy", "b", "c"]),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_from_documents_and_search() {
        let store = MemoryVectorStore::from_documents(
            docs(&[
                "Task decomposition breaks a complicated task into smaller steps",
                "Lisbon weather stays sunny through the summer",
                "Tree of thoughts explores several reasoning paths per step",
            ]),
            Arc::new(HashEmbedder::default()),
        )
        .await
        .unwrap();
        assert_eq!(store.len(), 3);

        let results = store
            .similarity_search_with_score("what is task decomposition", 2, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.metadata["id"], 0);
        assert!(results[0].1 >= results[1].1);
    }

    #[tokio::test]
    async fn test_k_larger_than_store() {
        let store = MemoryVectorStore::from_documents(
            docs(&["one", "two"]),
            Arc::new(HashEmbedder::default()),
        )
        .await
        .unwrap();
        let results = store.similarity_search("one", 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryVectorStore::new(Arc::new(HashEmbedder::default()));
        assert!(store.similarity_search("anything", 4, None).await.unwrap().is_empty());
        assert!(store
            .max_marginal_relevance_search("anything", 4, MmrOptions::default(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_vector_search_scores() {
        let store = handcrafted();
        let results = store
            .similarity_search_vector_with_score(&[0.0, 1.0, 0.0], 1, None)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.page_content, "b");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_filter() {
        let store = handcrafted();
        let not_a = |d: &Document| !d.page_content.starts_with('a');
        let results = store
            .similarity_search_vector_with_score(&[1.0, 0.0, 0.0], 4, Some(&not_a))
            .unwrap();
        let found: Vec<&str> = results.iter().map(|(d, _)| d.page_content.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&"b"));
        assert!(found.contains(&"c"));
    }

    #[test]
    fn test_mmr_prefers_diverse_results() {
        let store = handcrafted();
        let query = [1.0, 0.5, 0.0];

        let plain: Vec<Document> = store
            .similarity_search_vector_with_score(&query, 2, None)
            .unwrap()
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert_eq!(ids(&plain), vec![0, 1]);

        let diverse = store
            .max_marginal_relevance_search_by_vector(&query, 2, MmrOptions::default(), None)
            .unwrap();
        assert_eq!(ids(&diverse), vec![0, 2]);
    }

    #[test]
    fn test_add_vectors_length_mismatch() {
        let mut store = MemoryVectorStore::new(Arc::new(HashEmbedder::new(3)));
        let err = store
            .add_vectors(vec![vec![1.0, 0.0, 0.0]], docs(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::LengthMismatch { vectors: 1, documents: 2 }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = handcrafted();
        let err = store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["short"]))
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch { expected: 3, actual: 2 }
        ));

        let err = store
            .similarity_search_vector_with_score(&[1.0; 5], 1, None)
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch { expected: 3, actual: 5 }
        ));
    }

    #[test]
    fn test_as_retriever_with() {
        let store = Arc::new(handcrafted());
        let similarity = store
            .clone()
            .as_retriever_with(3, SearchType::Similarity, MmrOptions::default());
        assert_eq!(similarity.search_type(), SearchType::Similarity);
        assert_eq!(similarity.k(), 3);

        let mmr = store.as_retriever_with(2, SearchType::Mmr, MmrOptions::default());
        assert_eq!(mmr.search_type(), SearchType::Mmr);
    }
}
