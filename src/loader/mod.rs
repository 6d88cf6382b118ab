/// Document loaders: turn an external source into [`Document`]s.
pub mod web;

use async_trait::async_trait;
use thiserror::Error;

use crate::document::Document;

pub use web::{WebLoader, extract_text};

/// Errors that can occur while loading documents.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>, LoaderError>;
}
