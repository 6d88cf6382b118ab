/// Offline feature-hashing embedder.
///
/// Each lower-cased word is hashed into one of `dimensions` buckets with a
/// hash-derived sign, and the result is L2-normalised. Texts sharing words
/// get similar vectors, which is enough for tests and for running the
/// pipeline without an embeddings API.
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use super::{Embedder, EmbedderError};

pub const DEFAULT_DIMENSIONS: usize = 384;

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Create a new `HashEmbedder`; zero dimensions is raised to one.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
