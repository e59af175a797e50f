//! Intermediate document model shared by every converter and the graph writer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Ordered string → value metadata map
pub type Metadata = serde_json::Map<String, Value>;

/// Kind of content carried by an [`IngestedDoc`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text
    Text,
    /// Table with rows
    Table,
    /// Reserved, no converter emits images yet
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        }
    }
}

/// One record within a [`Table`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Unique row ID
    pub id: String,
    /// Zero-based position within the table
    pub index: usize,
    /// Column name → raw cell value, one entry per column
    pub data: Metadata,
    /// `"col: value, col: value."` rendering of the non-empty cells
    pub serialized_text: String,
}

impl Row {
    /// Build a row from header names and cell values.
    ///
    /// Missing trailing cells become empty strings so every column is present in `data`.
    pub fn from_cells(index: usize, headers: &[String], cells: &[String]) -> Self {
        let mut data = Metadata::new();
        for (i, header) in headers.iter().enumerate() {
            let value = cells.get(i).cloned().unwrap_or_default();
            data.insert(header.clone(), Value::String(value));
        }

        let pairs = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), cells.get(i).map(String::as_str).unwrap_or("")));

        Self {
            id: new_id(),
            index,
            data,
            serialized_text: serialize_cells(pairs),
        }
    }
}

/// Render `(column, value)` pairs as a sentence, skipping empty values
pub fn serialize_cells<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parts: Vec<String> = pairs
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(column, value)| format!("{}: {}", column, value))
        .collect();
    format!("{}.", parts.join(", "))
}

/// Render a pipe table: header, `---` separator sized to the header, then rows
pub fn render_markdown(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!("| {} |", headers.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));
    for row in rows {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    lines.join("\n")
}

/// A table extracted from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Unique table ID
    pub id: String,
    pub caption: String,
    /// Full markdown rendering for LLM context
    pub markdown: String,
    pub rows: Vec<Row>,
    pub metadata: Metadata,
}

impl Table {
    pub fn new(caption: impl Into<String>, markdown: String, rows: Vec<Row>, metadata: Metadata) -> Self {
        Self {
            id: new_id(),
            caption: caption.into(),
            markdown,
            rows,
            metadata,
        }
    }
}

/// Normalized unit of ingestion produced by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedDoc {
    /// Unique unit ID
    pub id: String,
    /// Text content, or the markdown rendering of a table
    pub content: String,
    pub content_type: ContentType,
    /// Always carries `source`, `filename` and `extension`
    pub metadata: Metadata,
    /// Present iff `content_type` is [`ContentType::Table`]
    pub table_data: Option<Table>,
    /// Set by vector indexing, outside this crate
    pub vector_id: Option<String>,
    /// Set after the unit has been written to the graph
    pub graph_node_id: Option<String>,
}

impl IngestedDoc {
    /// Create a text unit
    pub fn text(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            content_type: ContentType::Text,
            metadata,
            table_data: None,
            vector_id: None,
            graph_node_id: None,
        }
    }

    /// Create a table unit
    pub fn table(content: impl Into<String>, table: Table, metadata: Metadata) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            content_type: ContentType::Table,
            metadata,
            table_data: Some(table),
            vector_id: None,
            graph_node_id: None,
        }
    }

    /// Originating file path, if recorded
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    /// 1-based page number, if recorded
    pub fn page(&self) -> Option<i64> {
        self.metadata.get("page").and_then(Value::as_i64)
    }

    /// Replace generated ids with ids derived from `source` and the unit's
    /// position in the file, so repeated runs merge onto the same nodes.
    pub fn assign_stable_ids(&mut self, source: &str, position: usize) {
        let position = position.to_string();
        self.id = stable_id(&[source, "unit", &position]);
        if let Some(table) = self.table_data.as_mut() {
            table.id = stable_id(&[source, "table", &position]);
            for row in &mut table.rows {
                row.id = stable_id(&[&table.id, "row", &row.index.to_string()]);
            }
        }
    }
}

/// Result of parsing one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub file_path: String,
    pub documents: Vec<IngestedDoc>,
    /// Failures absorbed while converting
    pub errors: Vec<String>,
}

impl ExtractionResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// UUID-shaped id from the SHA-256 of the parts joined with `|`
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
