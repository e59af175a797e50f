//! Graph build binary
//!
//! Run with: cargo run -p docgraph --bin docgraph-build -- --input-dir data_raw

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docgraph::extraction::ConceptExtractor;
use docgraph::graph::{open_store, GraphConnector};
use docgraph::ingestion::UniversalParser;
use docgraph::pipeline::IngestionOrchestrator;
use docgraph::providers::{LlmProvider, OllamaClient};
use docgraph::PipelineConfig;

/// Build the concept graph from a directory of documents
#[derive(Debug, Parser)]
#[command(name = "docgraph-build", version, about)]
struct Args {
    /// Directory containing the files to ingest
    #[arg(long, default_value = "data_raw")]
    input_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgraph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if !args.input_dir.is_dir() {
        tracing::error!("Input directory {} not found.", args.input_dir.display());
        return Ok(());
    }

    let config = PipelineConfig::load()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Graph backend: {:?}", config.graph.backend);
    tracing::info!("  - Parallel files: {}", config.processing.parallel_files);

    let llm = OllamaClient::new(&config.llm)?;
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    match llm.health_check().await {
        Ok(true) => tracing::info!("Ollama is running"),
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("Concepts will be empty until it is reachable:");
            tracing::warn!("  1. Start: ollama serve");
            tracing::warn!("  2. Pull model: ollama pull {}", llm.model());
        }
    }

    let extractor = ConceptExtractor::new(Arc::new(llm), config.extraction.clone());
    let connector = GraphConnector::new(open_store(&config.graph)?);

    let orchestrator = IngestionOrchestrator::new(
        UniversalParser::new(),
        Arc::new(extractor),
        connector,
        &config,
    )
    .with_progress(true);

    let files = orchestrator.list_files(&args.input_dir)?;
    println!("Found {} files in {}", files.len(), args.input_dir.display());

    let summary = orchestrator.run(&args.input_dir).await?;

    println!("\n{}", summary);
    for failure in &summary.errors {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
    println!("Graph Build Completed.");

    Ok(())
}
