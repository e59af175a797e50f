//! Directory-level ingestion: parse, extract concepts, write the graph

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use walkdir::WalkDir;

use crate::config::{IdStrategy, PipelineConfig, ProcessingConfig};
use crate::error::{Error, Result};
use crate::extraction::ConceptExtractor;
use crate::graph::GraphConnector;
use crate::ingestion::UniversalParser;
use crate::types::{ContentType, IngestedDoc, Metadata};

/// One file that could not be ingested
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Counters for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub units_ingested: usize,
    pub rows_ingested: usize,
    pub concepts_linked: usize,
    pub errors: Vec<FileFailure>,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files found, {} processed, {} failed; {} units, {} rows, {} concept links",
            self.files_found,
            self.files_processed,
            self.files_failed,
            self.units_ingested,
            self.rows_ingested,
            self.concepts_linked
        )
    }
}

#[derive(Debug, Default)]
struct FileReport {
    units: usize,
    rows: usize,
    concepts: usize,
}

/// Drives parsing, concept extraction and graph writes over a directory
pub struct IngestionOrchestrator {
    parser: UniversalParser,
    extractor: Arc<ConceptExtractor>,
    connector: GraphConnector,
    processing: ProcessingConfig,
    row_concepts: bool,
    show_progress: bool,
}

impl IngestionOrchestrator {
    pub fn new(
        parser: UniversalParser,
        extractor: Arc<ConceptExtractor>,
        connector: GraphConnector,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            parser,
            extractor,
            connector,
            processing: config.processing.clone(),
            row_concepts: config.extraction.extract_row_concepts,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while files are processed
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Regular files under `input_dir`, sorted by path
    pub fn list_files(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        if !input_dir.is_dir() {
            return Err(Error::NotFound(input_dir.to_path_buf()));
        }

        let max_depth = if self.processing.recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Ingest every file in `input_dir`, then close the graph connection
    pub async fn run(&self, input_dir: &Path) -> Result<IngestSummary> {
        let result = self.run_files(input_dir).await;
        let closed = self.connector.close().await;

        let summary = result?;
        closed?;
        Ok(summary)
    }

    async fn run_files(&self, input_dir: &Path) -> Result<IngestSummary> {
        let files = self.list_files(input_dir)?;
        tracing::info!("Found {} files in {}", files.len(), input_dir.display());

        let progress = self.progress_bar(files.len());
        let semaphore = Arc::new(Semaphore::new(self.processing.parallel_files.max(1)));
        let file_timeout = Duration::from_secs(self.processing.file_timeout_secs);

        let futures = files.iter().map(|path| {
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::internal(format!("Worker pool closed: {}", e)))?;

                progress.set_message(file_name(path));
                let start = Instant::now();
                // A timed-out parse cannot be cancelled: the blocking task runs to
                // completion on tokio's blocking pool and its result is discarded.
                let result = match timeout(file_timeout, self.process_file(path)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        path: path.display().to_string(),
                        secs: file_timeout.as_secs(),
                    }),
                };
                progress.inc(1);

                tracing::debug!("Finished {} in {:.1}s", path.display(), start.elapsed().as_secs_f64());
                result
            }
        });
        let results = join_all(futures).await;
        progress.finish_and_clear();

        let mut summary = IngestSummary {
            files_found: files.len(),
            ..IngestSummary::default()
        };
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok(report) => {
                    summary.files_processed += 1;
                    summary.units_ingested += report.units;
                    summary.rows_ingested += report.rows;
                    summary.concepts_linked += report.concepts;
                }
                Err(e) => {
                    tracing::error!("Failed to process {}: {}", path.display(), e);
                    summary.files_failed += 1;
                    summary.errors.push(FileFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Ingestion finished: {}", summary);
        Ok(summary)
    }

    async fn process_file(&self, path: &Path) -> Result<FileReport> {
        let parser = self.parser;
        let owned = path.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || parser.extract(&owned, &Metadata::new()))
            .await
            .map_err(|e| Error::internal(format!("Parser task failed: {}", e)))??;

        if !extraction.is_clean() && extraction.documents.is_empty() {
            return Err(Error::format(extraction.file_path, extraction.errors.join("; ")));
        }

        let mut report = FileReport::default();
        for (position, mut doc) in extraction.documents.into_iter().enumerate() {
            if self.processing.id_strategy == IdStrategy::Stable {
                let source = doc.source().unwrap_or(extraction.file_path.as_str()).to_string();
                doc.assign_stable_ids(&source, position);
            }
            self.ingest_unit(&doc, &mut report).await?;
        }

        tracing::info!(
            "Ingested {}: {} units, {} rows",
            path.display(),
            report.units,
            report.rows
        );
        Ok(report)
    }

    async fn ingest_unit(&self, doc: &IngestedDoc, report: &mut FileReport) -> Result<()> {
        let concepts = self.extractor.extract(&doc.content).await;
        let node_id = self.connector.ingest(doc, &concepts).await?;
        tracing::debug!("Wrote {} node {}", doc.content_type.as_str(), node_id);
        report.units += 1;
        report.concepts += concepts.len();

        if doc.content_type != ContentType::Table {
            return Ok(());
        }
        let Some(table) = doc.table_data.as_ref() else {
            return Ok(());
        };

        for row in &table.rows {
            report.rows += 1;
            if !self.row_concepts {
                continue;
            }
            let row_concepts = self.extractor.extract(&row.serialized_text).await;
            if !row_concepts.is_empty() {
                self.connector.ingest_row_concepts(&row.id, &row_concepts).await?;
                report.concepts += row_concepts.len();
            }
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        ProgressBar::new(len as u64).with_style(style)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeLabel, SqliteGraphStore};
    use crate::providers::MockLlmProvider;
    use tempfile::TempDir;

    fn orchestrator(mock: MockLlmProvider, store: SqliteGraphStore, config: &PipelineConfig) -> IngestionOrchestrator {
        let extractor = ConceptExtractor::new(Arc::new(mock), config.extraction.clone());
        IngestionOrchestrator::new(
            UniversalParser::new(),
            Arc::new(extractor),
            GraphConnector::new(Arc::new(store)),
            config,
        )
    }

    fn concept_mock() -> MockLlmProvider {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .returning(|_| Ok(r#"{"concepts": ["Samsung", "Revenue"]}"#.to_string()));
        mock
    }

    #[test]
    fn test_list_files_depth() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.txt"), "c").unwrap();

        let mut config = PipelineConfig::default();
        let store = SqliteGraphStore::in_memory().unwrap();
        let flat = orchestrator(MockLlmProvider::new(), store.clone(), &config);
        let files = flat.list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);

        config.processing.recursive = true;
        let deep = orchestrator(MockLlmProvider::new(), store, &config);
        assert_eq!(deep.list_files(dir.path()).unwrap().len(), 3);

        assert!(matches!(
            deep.list_files(&dir.path().join("missing")),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_counts_and_closes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("notes.txt"),
            "Samsung Electronics reported record revenue this quarter.",
        )
        .unwrap();
        std::fs::write(dir.path().join("sales.csv"), "Company,Revenue\nSamsung,300\nLG,200\n").unwrap();
        std::fs::write(dir.path().join("broken.hwp"), "not a compound file").unwrap();

        let store = SqliteGraphStore::in_memory().unwrap();
        let config = PipelineConfig::default();
        let summary = orchestrator(concept_mock(), store.clone(), &config)
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(summary.files_found, 3);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.errors[0].path, dir.path().join("broken.hwp"));
        assert_eq!(summary.units_ingested, 2);
        assert_eq!(summary.rows_ingested, 2);
        // 2 per unit plus 2 per row
        assert_eq!(summary.concepts_linked, 8);

        // connection released after the run
        assert!(store.graph().node_count(NodeLabel::Document).is_err());
    }

    #[tokio::test]
    async fn test_row_concepts_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sales.csv"), "Company,Revenue\nSamsung,300\n").unwrap();

        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .times(1)
            .returning(|_| Ok(r#"{"concepts": ["Samsung"]}"#.to_string()));

        let mut config = PipelineConfig::default();
        config.extraction.extract_row_concepts = false;
        let summary = orchestrator(mock, SqliteGraphStore::in_memory().unwrap(), &config)
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(summary.rows_ingested, 1);
        assert_eq!(summary.concepts_linked, 1);
    }
}
