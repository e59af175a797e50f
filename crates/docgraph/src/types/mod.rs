//! Core types for the ingestion pipeline

pub mod document;

pub use document::{
    render_markdown, serialize_cells, stable_id, ContentType, ExtractionResult, IngestedDoc,
    Metadata, Row, Table,
};
