/// Embeddings through the OpenAI `/embeddings` endpoint.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError};
use crate::openai::OpenAiClient;

pub const DEFAULT_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_BATCH_SIZE: usize = 512;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    batch_size: usize,
    strip_new_lines: bool,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            strip_new_lines: true,
            dimensions: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replace newlines with spaces before embedding (on by default).
    #[must_use]
    pub fn with_strip_new_lines(mut self, strip: bool) -> Self {
        self.strip_new_lines = strip;
        self
    }

    /// Request shortened vectors; only newer models accept this.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn embed_chunk(&self, input: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
        };
        let response: EmbeddingResponse = self.client.post_json("embeddings", &request).await?;

        if response.data.len() != input.len() {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                response.data.len()
            )));
        }

        // Every index in 0..n must appear exactly once
        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; input.len()];
        for data in response.data {
            let slot = ordered
                .get_mut(data.index)
                .filter(|slot| slot.is_none())
                .ok_or_else(|| {
                    EmbedderError::InvalidResponse(format!(
                        "unexpected or duplicate embedding index {}",
                        data.index
                    ))
                })?;
            *slot = Some(data.embedding);
        }
        Ok(ordered.into_iter().flatten().collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let input: Vec<String> = if self.strip_new_lines {
                batch.iter().map(|t| t.replace('\n', " ")).collect()
            } else {
                batch.to_vec()
            };
            debug!("Embedding batch {} ({} texts) with {}", i + 1, input.len(), self.model);
            vectors.extend(self.embed_chunk(&input).await?);
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::ApiError;
    use crate::test_support;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Requests = Arc<Mutex<Vec<Value>>>;

    /// Replies with `[len(text), position]` per input, listed in reverse
    /// order so callers must sort by `index`.
    async fn fake_embeddings(
        State(requests): State<Requests>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        requests.lock().unwrap().push(body.clone());
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| {
                let len = text.as_str().unwrap_or_default().len() as f32;
                json!({ "object": "embedding", "index": i, "embedding": [len, i as f32] })
            })
            .collect();
        Json(json!({ "object": "list", "data": data, "model": body["model"] }))
    }

    async fn embedder(requests: Requests) -> OpenAiEmbedder {
        let app = Router::new()
            .route("/v1/embeddings", post(fake_embeddings))
            .with_state(requests);
        let base = test_support::serve(app).await;
        let base_url = format!("{base}/v1");
        let client = OpenAiClient::with_http(test_support::http_client(), &base_url, None)
            .with_retries(0, Duration::from_millis(1));
        OpenAiEmbedder::new(client, DEFAULT_MODEL)
    }

    #[tokio::test]
    async fn test_batches_and_orders_by_index() {
        let requests = Requests::default();
        let embedder = embedder(requests.clone()).await.with_batch_size(2);
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![2.0, 1.0]);
        assert_eq!(vectors[4], vec![5.0, 0.0]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["model"], DEFAULT_MODEL);
        assert!(requests[0].get("dimensions").is_none());
    }

    #[tokio::test]
    async fn test_strips_new_lines() {
        let requests = Requests::default();
        let embedder = embedder(requests.clone()).await;

        embedder.embed("line one\nline two").await.unwrap();

        assert_eq!(requests.lock().unwrap()[0]["input"][0], "line one line two");
    }

    #[tokio::test]
    async fn test_keeps_new_lines_when_disabled() {
        let requests = Requests::default();
        let embedder = embedder(requests.clone())
            .await
            .with_strip_new_lines(false)
            .with_dimensions(Some(256));

        embedder.embed("a\nb").await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["input"][0], "a\nb");
        assert_eq!(requests[0]["dimensions"], 256);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_invalid_response() {
        let app = Router::new().route(
            "/embeddings",
            post(|| async { Json(json!({ "data": [] })) }),
        );
        let base = test_support::serve(app).await;
        let client = OpenAiClient::with_http(test_support::http_client(), &base, None);
        let embedder = OpenAiEmbedder::new(client, DEFAULT_MODEL);

        let err = embedder.embed("query").await.unwrap_err();
        assert!(matches!(err, EmbedderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_bad_indices_are_invalid_response() {
        let app = Router::new()
            .route(
                "/dup/embeddings",
                post(|| async {
                    Json(json!({ "data": [
                        { "index": 0, "embedding": [1.0] },
                        { "index": 0, "embedding": [2.0] }
                    ] }))
                }),
            )
            .route(
                "/range/embeddings",
                post(|| async {
                    Json(json!({ "data": [
                        { "index": 0, "embedding": [1.0] },
                        { "index": 5, "embedding": [2.0] }
                    ] }))
                }),
            );
        let base = test_support::serve(app).await;
        let texts = vec!["first".to_string(), "second".to_string()];

        for path in ["dup", "range"] {
            let base_url = format!("{base}/{path}");
            let client = OpenAiClient::with_http(test_support::http_client(), &base_url, None);
            let embedder = OpenAiEmbedder::new(client, DEFAULT_MODEL);

            let err = embedder.embed_batch(&texts).await.unwrap_err();
            assert!(matches!(err, EmbedderError::InvalidResponse(_)), "{path}: {err}");
        }
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let app = Router::new().route(
            "/embeddings",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({ "error": { "message": "model not found" } })),
                )
            }),
        );
        let base = test_support::serve(app).await;
        let client = OpenAiClient::with_http(test_support::http_client(), &base, None);
        let embedder = OpenAiEmbedder::new(client, "missing-model");

        let err = embedder.embed("query").await.unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::Api(ApiError::Status { status: 400, .. })
        ));
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let requests = Requests::default();
        let embedder = embedder(requests.clone()).await;

        let vectors = embedder.embed_batch(&[]).await.unwrap();

        assert!(vectors.is_empty());
        assert!(requests.lock().unwrap().is_empty());
    }
}
