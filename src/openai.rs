/// Minimal client for OpenAI-compatible JSON endpoints.
///
/// Shared by the embeddings and chat clients: bearer authentication,
/// request timeout, and retries with exponential backoff for transport
/// failures, `429` and `5xx` responses.
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Backoff doubles per attempt up to this exponent.
const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => {
                !source.is_builder() && !source.is_redirect() && !source.is_decode()
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Client(_) | Self::Decode { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: usize,
    retry_base_delay: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self::with_http(http, base_url, api_key))
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_http(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            max_retries: 6,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: usize, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `{base_url}/{path}` and decode the JSON reply.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempt = 0usize;

        loop {
            match self.send_once(&url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let exponent = (attempt as u32).min(MAX_BACKOFF_EXPONENT);
                    let delay = self.retry_base_delay * 2u32.pow(exponent);
                    attempt += 1;
                    warn!(
                        "Request to {url} failed ({attempt}/{}): {e}; retrying in {delay:?}",
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let bytes = resp.bytes().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!("{url} replied with {} bytes", bytes.len());

        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Pull `error.message` out of an OpenAI error body, else return the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
