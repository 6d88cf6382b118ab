/// Configuration module for webrag.
///
/// Handles loading, validating, and providing default configuration values.
/// Precedence is command line, then environment, then config file, then
/// the defaults below.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::retriever::SearchType;
use crate::splitter::DEFAULT_SEPARATORS;

pub const DEFAULT_CONFIG_PATH: &str = "webrag.json";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["OPENAI_KEY", "OPENAI_API_KEY"];
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

// ── Default value functions ──────────────────────────────────────────

fn default_source_url() -> String {
    "https://lilianweng.github.io/posts/2023-06-23-agent/".to_string()
}

fn default_query() -> String {
    "What is task decomposition?".to_string()
}

fn default_true() -> bool {
    true
}

fn default_selector() -> String {
    crate::loader::web::DEFAULT_SELECTOR.to_string()
}

fn default_loader_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("webrag/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_separators() -> Vec<String> {
    DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect()
}

fn default_embedding_model() -> String {
    crate::embedder::openai::DEFAULT_MODEL.to_string()
}

fn default_batch_size() -> usize {
    crate::embedder::openai::DEFAULT_BATCH_SIZE
}

fn default_top_k() -> usize {
    4
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda() -> f32 {
    0.5
}

fn default_chat_model() -> String {
    crate::llm::openai::DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    crate::openai::DEFAULT_BASE_URL.to_string()
}

fn default_api_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    6
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_source_url")]
    pub source_url: String,

    #[serde(default = "default_query")]
    pub query: String,

    #[serde(default)]
    pub return_source_documents: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub splitter: SplitterConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    /// CSS selector whose text becomes the document
    #[serde(default = "default_selector")]
    pub selector: String,

    #[serde(default = "default_loader_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SplitterConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub chunk_overlap: usize,

    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    /// Offline feature hashing, no API calls
    Hash,
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            other => Err(format!("unknown embedding provider {other:?} (expected openai or hash)")),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Hash => f.write_str("hash"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub strip_new_lines: bool,

    /// Requested vector size (OpenAI) or bucket count (hash)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub search_type: SearchType,

    /// MMR only
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// MMR only
    #[serde(default = "default_lambda")]
    pub lambda: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Never written back to disk; usually supplied through the environment.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            query: default_query(),
            return_source_documents: false,
            show_progress: default_true(),
            loader: LoaderConfig::default(),
            splitter: SplitterConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            selector: default_selector(),
            timeout_secs: default_loader_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            separators: default_separators(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            strip_new_lines: default_true(),
            dimensions: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            search_type: SearchType::default(),
            fetch_k: default_fetch_k(),
            lambda: default_lambda(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_api_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"webrag.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file. The API key is never written.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to read variables.
    ///
    /// The API key from the environment only fills an unset key; the base
    /// URL variable always wins.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let configured = self.openai.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !configured {
            self.openai.api_key = API_KEY_VARS
                .iter()
                .filter_map(|&var| lookup(var))
                .find(|value| !value.is_empty());
        }

        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|v| !v.is_empty()) {
            info!("Using API base URL from {BASE_URL_VAR}");
            self.openai.base_url = base_url;
        }
    }

    /// Whether the configured endpoints are hosted OpenAI or Azure OpenAI,
    /// which reject unauthenticated requests.
    #[must_use]
    pub fn requires_api_key(&self) -> bool {
        Url::parse(&self.openai.base_url)
            .ok()
            .and_then(|u| u.host_str().map(is_hosted_openai))
            .unwrap_or(false)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.source_url)
            .with_context(|| format!("source_url is not a valid URL: {}", self.source_url))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "source_url must be http or https"
        );
        anyhow::ensure!(!self.query.trim().is_empty(), "query must not be empty");
        anyhow::ensure!(
            !self.loader.selector.trim().is_empty(),
            "loader.selector must not be empty"
        );
        anyhow::ensure!(
            self.loader.timeout_secs > 0,
            "loader.timeout_secs must be positive"
        );

        anyhow::ensure!(
            self.splitter.chunk_size > 0,
            "splitter.chunk_size must be positive"
        );
        anyhow::ensure!(
            self.splitter.chunk_overlap < self.splitter.chunk_size,
            "splitter.chunk_overlap must be smaller than splitter.chunk_size"
        );

        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            self.embedding.dimensions != Some(0),
            "embedding.dimensions must be positive"
        );

        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be positive");
        if self.retrieval.search_type == SearchType::Mmr {
            anyhow::ensure!(
                self.retrieval.fetch_k >= self.retrieval.top_k,
                "retrieval.fetch_k must be at least retrieval.top_k"
            );
            anyhow::ensure!(
                (0.0..=1.0).contains(&self.retrieval.lambda),
                "retrieval.lambda must be between 0 and 1"
            );
        }

        Url::parse(&self.openai.base_url).with_context(|| {
            format!("openai.base_url is not a valid URL: {}", self.openai.base_url)
        })?;
        anyhow::ensure!(
            self.openai.timeout_secs > 0,
            "openai.timeout_secs must be positive"
        );
        if self.requires_api_key() {
            anyhow::ensure!(
                self.openai.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                "no API key: set {} (or {}) or openai.api_key",
                API_KEY_VARS[0],
                API_KEY_VARS[1]
            );
        }

        Ok(())
    }
}

fn is_hosted_openai(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "openai.com" || host.ends_with(".openai.com") || host.ends_with(".openai.azure.com")
}

// ── Tests ────────────────────────────────────────────────────────────
