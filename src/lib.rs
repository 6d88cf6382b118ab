//! # webrag: Retrieval-augmented question answering over a web page
//!
//! Fetches a page, splits its text into chunks, embeds the chunks into an
//! in-memory vector store, retrieves the chunks relevant to a query, and
//! asks a chat model to answer from them.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, env overrides, and validation
//! - **[`loader`]**: Web page fetching and CSS-selector text extraction
//! - **[`splitter`]**: Recursive character text splitting
//! - **[`embedder`]**: Text embedding via an OpenAI-compatible API, or offline hashing
//! - **[`vectorstore`]**: Brute-force cosine similarity and MMR search in memory
//! - **[`retriever`]**: Query → documents adapters over the vector store
//! - **[`llm`]**: Chat completion models
//! - **[`chain`]**: Retrieval QA chain ("stuff documents" prompt)
//! - **[`openai`]**: Shared HTTP client with retry for OpenAI-compatible endpoints
//! - **[`pipeline`]**: The end-to-end run wiring all of the above

pub mod chain;
pub mod config;
pub mod document;
pub mod embedder;
pub mod llm;
pub mod loader;
pub mod openai;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod vectorstore;

#[cfg(test)]
mod test_support;
