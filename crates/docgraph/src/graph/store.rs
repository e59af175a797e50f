//! Property-graph store abstraction used by the graph connector

use async_trait::async_trait;

use crate::error::Result;

/// Node label in the ingestion graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Document,
    Chunk,
    Table,
    Row,
    Concept,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Chunk => "Chunk",
            Self::Table => "Table",
            Self::Row => "Row",
            Self::Concept => "Concept",
        }
    }

    /// Merge key property for this label
    pub fn key_property(&self) -> &'static str {
        match self {
            Self::Concept => "name",
            _ => "id",
        }
    }
}

/// Relationship types in the ingestion graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelType {
    /// Document → Chunk | Table
    Contains,
    /// Table → Row
    HasRow,
    /// Chunk | Table | Row → Concept
    Mentions,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::HasRow => "HAS_ROW",
            Self::Mentions => "MENTIONS",
        }
    }
}

/// Properties of a `Chunk` node
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkNode {
    pub id: String,
    pub text: String,
    pub page: i64,
    pub vector_id: String,
}

/// Properties of a `Table` node
#[derive(Debug, Clone, PartialEq)]
pub struct TableNode {
    pub id: String,
    pub caption: String,
    pub markdown: String,
}

/// Properties of a `Row` node
#[derive(Debug, Clone, PartialEq)]
pub struct RowNode {
    pub id: String,
    pub index: i64,
    /// Row data serialized as a JSON object string
    pub data_json: String,
    pub serialized_text: String,
}

/// Merge-only writer over a property-graph backend.
///
/// Every method has MERGE semantics: a node or relationship is created when
/// its key is absent, and create-time properties are left untouched when it
/// already exists. Child merges are no-ops when their parent node is missing.
///
/// Implementations:
/// - `SqliteGraphStore`: embedded SQLite property graph
/// - `Neo4jStore`: Neo4j over the HTTP transactional API
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge a `Document` keyed by source path
    async fn merge_document(&self, id: &str) -> Result<()>;

    /// Merge a `Chunk` and `Document-[:CONTAINS]->Chunk`
    async fn merge_chunk(&self, document_id: &str, chunk: &ChunkNode) -> Result<()>;

    /// Merge a `Table` and `Document-[:CONTAINS]->Table`
    async fn merge_table(&self, document_id: &str, table: &TableNode) -> Result<()>;

    /// Batch-merge `Row` nodes and `Table-[:HAS_ROW]->Row`
    async fn merge_rows(&self, table_id: &str, rows: &[RowNode]) -> Result<()>;

    /// Merge `Concept` nodes by name and link them from the given node with `MENTIONS`
    async fn merge_mentions(&self, label: NodeLabel, id: &str, concepts: &[String]) -> Result<()>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
