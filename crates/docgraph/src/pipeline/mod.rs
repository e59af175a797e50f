//! Batch ingestion over a directory of files

mod orchestrator;

pub use orchestrator::{FileFailure, IngestSummary, IngestionOrchestrator};
