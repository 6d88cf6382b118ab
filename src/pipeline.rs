//! End-to-end run: load → split → embed → retrieve → answer.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::info;

use crate::chain::{ChainError, ChainOutput, RetrievalQaChain};
use crate::config::{Config, EmbeddingProvider};
use crate::embedder::{Embedder, HashEmbedder, OpenAiEmbedder};
use crate::llm::{ChatModel, OpenAiChat};
use crate::loader::{DocumentLoader, WebLoader};
use crate::openai::OpenAiClient;
use crate::retriever::{Retriever, SearchType};
use crate::splitter::RecursiveCharacterTextSplitter;
use crate::vectorstore::{MemoryVectorStore, MmrOptions};

/// What one run produced, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Documents returned by the loader
    pub documents: usize,
    /// Chunks embedded into the store
    pub chunks: usize,
    /// Chunks the retriever found relevant to the query
    pub relevant: usize,
    pub output: ChainOutput,
}

/// Retrieval settings used for both the relevance count and the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub search_type: SearchType,
    pub mmr: MmrOptions,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            search_type: SearchType::Similarity,
            mmr: MmrOptions::default(),
        }
    }
}

pub struct Pipeline {
    loader: Box<dyn DocumentLoader>,
    splitter: RecursiveCharacterTextSplitter,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    retrieval: RetrievalSettings,
    return_source_documents: bool,
    progress: ProgressBar,
}

impl Pipeline {
    pub fn new(
        loader: Box<dyn DocumentLoader>,
        splitter: RecursiveCharacterTextSplitter,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            loader,
            splitter,
            embedder,
            llm,
            retrieval: RetrievalSettings::default(),
            return_source_documents: false,
            progress: ProgressBar::hidden(),
        }
    }

    /// Build every component from a validated [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let loader = WebLoader::new(&config.source_url)
            .context("invalid source URL")?
            .with_selector(config.loader.selector.as_str())
            .with_timeout(Duration::from_secs(config.loader.timeout_secs))
            .with_user_agent(config.loader.user_agent.as_str());

        let splitter = RecursiveCharacterTextSplitter::new(
            config.splitter.chunk_size,
            config.splitter.chunk_overlap,
        )
        .context("invalid splitter settings")?
        .with_separators(config.splitter.separators.clone());

        let client = OpenAiClient::new(
            &config.openai.base_url,
            config.openai.api_key.clone(),
            Duration::from_secs(config.openai.timeout_secs),
        )
        .context("failed to build API client")?
        .with_retries(
            config.openai.max_retries,
            Duration::from_millis(config.openai.retry_base_delay_ms),
        );

        let embedder: Arc<dyn Embedder> = match config.embedding.provider {
            EmbeddingProvider::OpenAi => Arc::new(
                OpenAiEmbedder::new(client.clone(), config.embedding.model.as_str())
                    .with_batch_size(config.embedding.batch_size)
                    .with_strip_new_lines(config.embedding.strip_new_lines)
                    .with_dimensions(config.embedding.dimensions),
            ),
            EmbeddingProvider::Hash => Arc::new(match config.embedding.dimensions {
                Some(dims) => HashEmbedder::new(dims),
                None => HashEmbedder::default(),
            }),
        };
        info!("Embedding provider: {}", config.embedding.provider);

        let llm: Arc<dyn ChatModel> = Arc::new(
            OpenAiChat::new(client, config.llm.model.as_str())
                .with_temperature(config.llm.temperature)
                .with_max_tokens(config.llm.max_tokens),
        );

        let retrieval = RetrievalSettings {
            top_k: config.retrieval.top_k,
            search_type: config.retrieval.search_type,
            mmr: MmrOptions {
                fetch_k: config.retrieval.fetch_k,
                lambda: config.retrieval.lambda,
            },
        };

        Ok(Self::new(Box::new(loader), splitter, embedder, llm)
            .with_retrieval(retrieval)
            .with_source_documents(config.return_source_documents))
    }

    #[must_use]
    pub fn with_retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    #[must_use]
    pub fn with_source_documents(mut self, enabled: bool) -> Self {
        self.return_source_documents = enabled;
        self
    }

    /// Report stage changes on `progress`. Hidden by default.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, query: &str) -> Result<PipelineReport> {
        let query = query.trim();
        anyhow::ensure!(!query.is_empty(), ChainError::EmptyQuery);

        let result = self.run_stages(query).await;
        self.progress.finish_and_clear();
        result
    }

    async fn run_stages(&self, query: &str) -> Result<PipelineReport> {
        let pb = &self.progress;

        // 1. Load
        pb.set_message("Fetching document...");
        let documents = self.loader.load().await.context("failed to load document")?;
        info!("Loaded {} document(s)", documents.len());

        // 2. Split
        pb.set_message("Splitting text...");
        let chunks = self.splitter.split_documents(&documents);
        info!("Split into {} chunks", chunks.len());
        let chunk_count = chunks.len();

        // 3. Embed and store
        pb.set_message(format!("Embedding {chunk_count} chunks..."));
        let store = MemoryVectorStore::from_documents(chunks, self.embedder.clone())
            .await
            .context("failed to build vector store")?;
        let retriever: Arc<dyn Retriever> = Arc::new(Arc::new(store).as_retriever_with(
            self.retrieval.top_k,
            self.retrieval.search_type,
            self.retrieval.mmr,
        ));

        // 4. Retrieve
        pb.set_message("Searching...");
        let relevant = retriever
            .retrieve(query)
            .await
            .context("failed to search vector store")?;
        info!("Found {} relevant chunks", relevant.len());

        // 5. Answer
        pb.set_message(format!("Asking {}...", self.llm.model_name()));
        let chain = RetrievalQaChain::new(self.llm.clone(), retriever)
            .with_source_documents(self.return_source_documents);
        let output = chain.call(query).await.context("retrieval QA chain failed")?;

        Ok(PipelineReport {
            documents: documents.len(),
            chunks: chunk_count,
            relevant: relevant.len(),
            output,
        })
    }
}
