use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use webrag::config::{Config, EmbeddingProvider};
use webrag::pipeline::Pipeline;
use webrag::retriever::SearchType;

/// Answer a question from the contents of a web page.
#[derive(Parser, Debug)]
#[command(name = "webrag", version, about)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "")]
    config: String,

    /// Page to fetch
    #[arg(long)]
    url: Option<String>,

    /// Question to ask
    #[arg(short, long)]
    query: Option<String>,

    /// CSS selector whose text is indexed
    #[arg(long)]
    selector: Option<String>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// similarity | mmr
    #[arg(long)]
    search_type: Option<SearchType>,

    /// openai | hash
    #[arg(long)]
    embedding_provider: Option<EmbeddingProvider>,

    /// Chat model name
    #[arg(short, long)]
    model: Option<String>,

    /// Include the retrieved chunks in the output
    #[arg(long)]
    show_sources: bool,

    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Command-line values win over the config file and environment.
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.source_url = url.clone();
        }
        if let Some(query) = &self.query {
            config.query = query.clone();
        }
        if let Some(selector) = &self.selector {
            config.loader.selector = selector.clone();
        }
        if let Some(size) = self.chunk_size {
            config.splitter.chunk_size = size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.splitter.chunk_overlap = overlap;
        }
        if let Some(k) = self.top_k {
            config.retrieval.top_k = k;
        }
        if let Some(search_type) = self.search_type {
            config.retrieval.search_type = search_type;
        }
        if let Some(provider) = self.embedding_provider {
            config.embedding.provider = provider;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if self.show_sources {
            config.return_source_documents = true;
        }
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // 1. Load config
    let mut config = Config::load(&cli.config)?;
    config.apply_env();
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!("Source: {}", config.source_url);
    info!("Query: {}", config.query);

    // 2. Build pipeline
    let mut pipeline = Pipeline::from_config(&config)?;
    if config.show_progress && std::io::stderr().is_terminal() {
        pipeline = pipeline.with_progress(spinner());
    }

    // 3. Run
    let report = pipeline.run(&config.query).await?;

    // 4. Print
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.relevant);
        println!("{}", serde_json::to_string_pretty(&report.output)?);
    }

    Ok(())
}
