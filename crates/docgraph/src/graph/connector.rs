//! Writes ingested units and their concepts into the graph store

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ContentType, IngestedDoc};

use super::store::{ChunkNode, GraphStore, NodeLabel, RowNode, TableNode};

/// Document id used when a unit carries no `source`
pub const UNKNOWN_SOURCE: &str = "Unknown_Source";

/// Maps [`IngestedDoc`] units onto `Document`, `Chunk`, `Table`, `Row` and
/// `Concept` nodes.
#[derive(Clone)]
pub struct GraphConnector {
    store: Arc<dyn GraphStore>,
}

impl GraphConnector {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Merge one unit with its concepts, returning the chunk or table id written
    pub async fn ingest(&self, doc: &IngestedDoc, concepts: &[String]) -> Result<String> {
        let source = doc.source().unwrap_or(UNKNOWN_SOURCE);
        self.store.merge_document(source).await?;

        match doc.content_type {
            ContentType::Table => self.ingest_table(source, doc, concepts).await,
            _ => self.ingest_chunk(source, doc, concepts).await,
        }
    }

    async fn ingest_chunk(&self, source: &str, doc: &IngestedDoc, concepts: &[String]) -> Result<String> {
        let chunk = ChunkNode {
            id: doc.id.clone(),
            text: doc.content.clone(),
            page: doc.page().unwrap_or(1),
            vector_id: doc.vector_id.clone().unwrap_or_default(),
        };
        self.store.merge_chunk(source, &chunk).await?;
        self.store.merge_mentions(NodeLabel::Chunk, &chunk.id, concepts).await?;

        tracing::debug!("Merged chunk {} with {} concepts", chunk.id, concepts.len());
        Ok(chunk.id)
    }

    async fn ingest_table(&self, source: &str, doc: &IngestedDoc, concepts: &[String]) -> Result<String> {
        let table = doc
            .table_data
            .as_ref()
            .ok_or_else(|| Error::format(source, format!("table unit {} has no table data", doc.id)))?;

        let node = TableNode {
            id: table.id.clone(),
            caption: table.caption.clone(),
            markdown: table.markdown.clone(),
        };
        self.store.merge_table(source, &node).await?;
        self.store.merge_mentions(NodeLabel::Table, &node.id, concepts).await?;

        let rows = table
            .rows
            .iter()
            .map(|row| {
                Ok(RowNode {
                    id: row.id.clone(),
                    index: row.index as i64,
                    data_json: serde_json::to_string(&row.data)?,
                    serialized_text: row.serialized_text.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.store.merge_rows(&node.id, &rows).await?;

        tracing::debug!("Merged table {} with {} rows", node.id, rows.len());
        Ok(node.id)
    }

    /// Link an existing row to concepts; no-op for an empty list
    pub async fn ingest_row_concepts(&self, row_id: &str, concepts: &[String]) -> Result<()> {
        if concepts.is_empty() {
            return Ok(());
        }
        self.store.merge_mentions(NodeLabel::Row, row_id, concepts).await
    }

    pub async fn close(&self) -> Result<()> {
        tracing::info!("Closing {} graph store", self.store.name());
        self.store.close().await
    }
}
