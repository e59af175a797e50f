//! docgraph: document-to-graph ingestion pipeline
//!
//! Converts HWP, HWPX, PDF, CSV and spreadsheet files into a uniform
//! [`IngestedDoc`] model, extracts concepts from every unit with a local LLM,
//! and merges documents, chunks, tables, rows and concepts into a property graph.

pub mod config;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use types::{ContentType, ExtractionResult, IngestedDoc, Metadata, Row, Table};
