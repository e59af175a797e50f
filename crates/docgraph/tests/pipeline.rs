//! End-to-end ingestion over a temporary directory and SQLite graph

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docgraph::config::IdStrategy;
use docgraph::extraction::ConceptExtractor;
use docgraph::graph::{GraphConnector, NodeLabel, RelType, SqliteGraph, SqliteGraphStore};
use docgraph::ingestion::UniversalParser;
use docgraph::pipeline::{IngestSummary, IngestionOrchestrator};
use docgraph::providers::LlmProvider;
use docgraph::{PipelineConfig, Result};

/// Returns a fixed JSON answer and counts calls
struct FixedLlm {
    output: String,
    calls: AtomicUsize,
}

impl FixedLlm {
    fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for FixedLlm {
    async fn generate_json(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

fn write_inputs(dir: &Path) {
    std::fs::write(
        dir.join("notes.txt"),
        "Samsung Electronics announced record revenue for 2024.",
    )
    .unwrap();
    std::fs::write(
        dir.join("sales.csv"),
        "Company,Year,Revenue\nSamsung,2024,300\nLG,2024,120\n",
    )
    .unwrap();
}

async fn ingest(input: &Path, db: &Path, llm: Arc<dyn LlmProvider>, config: &PipelineConfig) -> IngestSummary {
    let store = SqliteGraphStore::open(db).unwrap();
    let extractor = ConceptExtractor::new(llm, config.extraction.clone());
    let orchestrator = IngestionOrchestrator::new(
        UniversalParser::new(),
        Arc::new(extractor),
        GraphConnector::new(Arc::new(store)),
        config,
    );
    orchestrator.run(input).await.unwrap()
}

fn counts(db: &Path) -> [usize; 5] {
    let graph = SqliteGraph::open(db).unwrap();
    [
        NodeLabel::Document,
        NodeLabel::Chunk,
        NodeLabel::Table,
        NodeLabel::Row,
        NodeLabel::Concept,
    ]
    .map(|label| graph.node_count(label).unwrap())
}

#[tokio::test]
async fn test_reingest_with_random_ids_appends_children() {
    let input = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("graph.db");
    write_inputs(input.path());

    let config = PipelineConfig::default();
    let llm = Arc::new(FixedLlm::new(r#"{"concepts": ["Samsung", "Revenue"]}"#));

    let first = ingest(input.path(), &db, llm.clone(), &config).await;
    assert_eq!(first.files_processed, 2);
    assert_eq!(first.units_ingested, 2);
    assert_eq!(first.rows_ingested, 2);
    assert_eq!(counts(&db), [2, 1, 1, 2, 2]);

    ingest(input.path(), &db, llm.clone(), &config).await;
    // documents and concepts merge; chunks, tables and rows get fresh ids
    assert_eq!(counts(&db), [2, 2, 2, 4, 2]);

    // one call per unit and per row, each run
    assert_eq!(llm.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_reingest_with_stable_ids_is_idempotent() {
    let input = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("graph.db");
    write_inputs(input.path());

    let mut config = PipelineConfig::default();
    config.processing.id_strategy = IdStrategy::Stable;
    let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm::new(r#"{"concepts": ["Samsung", "Revenue"]}"#));

    ingest(input.path(), &db, llm.clone(), &config).await;
    let after_first = counts(&db);
    let mentions_first = SqliteGraph::open(&db)
        .unwrap()
        .relationship_count(RelType::Mentions)
        .unwrap();

    ingest(input.path(), &db, llm, &config).await;
    assert_eq!(counts(&db), after_first);
    assert_eq!(after_first, [2, 1, 1, 2, 2]);
    assert_eq!(
        SqliteGraph::open(&db)
            .unwrap()
            .relationship_count(RelType::Mentions)
            .unwrap(),
        mentions_first
    );
}

#[tokio::test]
async fn test_bad_files_and_bad_model_output_do_not_stop_the_run() {
    let input = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("graph.db");
    write_inputs(input.path());
    std::fs::write(input.path().join("broken.hwpx"), "definitely not a zip").unwrap();
    std::fs::write(input.path().join("legacy.hwp"), "definitely not a compound file").unwrap();

    let mut config = PipelineConfig::default();
    config.processing.parallel_files = 3;
    let llm = Arc::new(FixedLlm::new("I think the concepts are Samsung and revenue."));

    let summary = ingest(input.path(), &db, llm, &config).await;
    assert_eq!(summary.files_found, 4);
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.files_failed, 2);
    assert_eq!(summary.concepts_linked, 0);

    let failed: Vec<_> = summary
        .errors
        .iter()
        .filter_map(|f| f.path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(failed, vec!["broken.hwpx", "legacy.hwp"]);

    assert_eq!(counts(&db), [2, 1, 1, 2, 0]);
}
