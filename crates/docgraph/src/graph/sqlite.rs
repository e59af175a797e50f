//! Embedded property graph on SQLite
//!
//! Nodes are keyed by `(label, key)` and relationships by their full
//! endpoint tuple, so `INSERT ... ON CONFLICT DO NOTHING` gives MERGE semantics.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::store::{ChunkNode, GraphStore, NodeLabel, RelType, RowNode, TableNode};

/// SQLite-backed property graph with synchronous access
pub struct SqliteGraph {
    conn: Mutex<Option<Connection>>,
}

impl SqliteGraph {
    /// Create or open the graph database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::store(format!("Failed to open graph database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory graph
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("Failed to open in-memory graph: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let graph = Self {
            conn: Mutex::new(Some(conn)),
        };
        graph.migrate()?;
        Ok(graph)
    }

    fn migrate(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                "#,
            )?;

            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS nodes (
                    label TEXT NOT NULL,
                    key TEXT NOT NULL,
                    properties TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (label, key)
                );

                CREATE TABLE IF NOT EXISTS relationships (
                    rel_type TEXT NOT NULL,
                    from_label TEXT NOT NULL,
                    from_key TEXT NOT NULL,
                    to_label TEXT NOT NULL,
                    to_key TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (rel_type, from_label, from_key, to_label, to_key)
                );

                CREATE INDEX IF NOT EXISTS idx_relationships_to
                    ON relationships(to_label, to_key);
                "#,
            )?;

            tracing::debug!("Graph schema ready");
            Ok(())
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::store("Graph store is closed"))?;
        f(conn)
    }

    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>, &str) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = chrono::Utc::now().to_rfc3339();
            let value = f(&tx, &now)?;
            tx.commit()?;
            Ok(value)
        })
    }

    pub fn merge_document(&self, id: &str) -> Result<()> {
        self.in_transaction(|tx, now| {
            let props = json!({
                "id": id,
                "title": id,
                "created_at": chrono::Utc::now().timestamp_millis(),
            });
            merge_node(tx, NodeLabel::Document, id, &props, now)?;
            Ok(())
        })
    }

    pub fn merge_chunk(&self, document_id: &str, chunk: &ChunkNode) -> Result<()> {
        self.in_transaction(|tx, now| {
            if !node_exists(tx, NodeLabel::Document, document_id)? {
                tracing::debug!("Document {} missing, skipping chunk {}", document_id, chunk.id);
                return Ok(());
            }
            let props = json!({
                "id": chunk.id,
                "text": chunk.text,
                "page": chunk.page,
                "vector_id": chunk.vector_id,
            });
            merge_node(tx, NodeLabel::Chunk, &chunk.id, &props, now)?;
            merge_rel(
                tx,
                RelType::Contains,
                (NodeLabel::Document, document_id),
                (NodeLabel::Chunk, &chunk.id),
                now,
            )?;
            Ok(())
        })
    }

    pub fn merge_table(&self, document_id: &str, table: &TableNode) -> Result<()> {
        self.in_transaction(|tx, now| {
            if !node_exists(tx, NodeLabel::Document, document_id)? {
                tracing::debug!("Document {} missing, skipping table {}", document_id, table.id);
                return Ok(());
            }
            let props = json!({
                "id": table.id,
                "caption": table.caption,
                "markdown": table.markdown,
            });
            merge_node(tx, NodeLabel::Table, &table.id, &props, now)?;
            merge_rel(
                tx,
                RelType::Contains,
                (NodeLabel::Document, document_id),
                (NodeLabel::Table, &table.id),
                now,
            )?;
            Ok(())
        })
    }

    pub fn merge_rows(&self, table_id: &str, rows: &[RowNode]) -> Result<()> {
        self.in_transaction(|tx, now| {
            if !node_exists(tx, NodeLabel::Table, table_id)? {
                return Ok(());
            }
            for row in rows {
                let props = json!({
                    "id": row.id,
                    "index": row.index,
                    "data_json": row.data_json,
                    "serialized_text": row.serialized_text,
                });
                merge_node(tx, NodeLabel::Row, &row.id, &props, now)?;
                merge_rel(
                    tx,
                    RelType::HasRow,
                    (NodeLabel::Table, table_id),
                    (NodeLabel::Row, &row.id),
                    now,
                )?;
            }
            Ok(())
        })
    }

    pub fn merge_mentions(&self, label: NodeLabel, id: &str, concepts: &[String]) -> Result<()> {
        self.in_transaction(|tx, now| {
            if !node_exists(tx, label, id)? {
                return Ok(());
            }
            for name in concepts {
                merge_node(tx, NodeLabel::Concept, name, &json!({ "name": name }), now)?;
                merge_rel(tx, RelType::Mentions, (label, id), (NodeLabel::Concept, name), now)?;
            }
            Ok(())
        })
    }

    /// Number of nodes with `label`
    pub fn node_count(&self, label: NodeLabel) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                params![label.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Number of relationships of `rel_type`
    pub fn relationship_count(&self, rel_type: RelType) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE rel_type = ?1",
                params![rel_type.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Stored properties of one node
    pub fn node_properties(&self, label: NodeLabel, key: &str) -> Result<Option<Value>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT properties FROM nodes WHERE label = ?1 AND key = ?2",
                    params![label.as_str(), key],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|s| serde_json::from_str(&s).map_err(Error::from))
                .transpose()
        })
    }

    /// Close the connection; later calls fail with a store error
    pub fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| Error::store(format!("Failed to close graph database: {}", e)))?;
            tracing::debug!("Graph database closed");
        }
        Ok(())
    }
}

fn node_exists(tx: &Transaction<'_>, label: NodeLabel, key: &str) -> Result<bool> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM nodes WHERE label = ?1 AND key = ?2",
            params![label.as_str(), key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn merge_node(tx: &Transaction<'_>, label: NodeLabel, key: &str, props: &Value, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO nodes (label, key, properties, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(label, key) DO NOTHING
        "#,
        params![label.as_str(), key, props.to_string(), now],
    )?;
    Ok(())
}

fn merge_rel(
    tx: &Transaction<'_>,
    rel_type: RelType,
    from: (NodeLabel, &str),
    to: (NodeLabel, &str),
    now: &str,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO relationships (rel_type, from_label, from_key, to_label, to_key, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT DO NOTHING
        "#,
        params![
            rel_type.as_str(),
            from.0.as_str(),
            from.1,
            to.0.as_str(),
            to.1,
            now
        ],
    )?;
    Ok(())
}

/// Async [`GraphStore`] over a [`SqliteGraph`], running each write on the blocking pool
#[derive(Clone)]
pub struct SqliteGraphStore {
    graph: Arc<SqliteGraph>,
}

impl SqliteGraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            graph: Arc::new(SqliteGraph::open(path)?),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            graph: Arc::new(SqliteGraph::in_memory()?),
        })
    }

    /// Underlying graph for direct inspection
    pub fn graph(&self) -> &Arc<SqliteGraph> {
        &self.graph
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteGraph) -> Result<T> + Send + 'static,
    {
        let graph = self.graph.clone();
        tokio::task::spawn_blocking(move || f(&graph))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn merge_document(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |g| g.merge_document(&id)).await
    }

    async fn merge_chunk(&self, document_id: &str, chunk: &ChunkNode) -> Result<()> {
        let document_id = document_id.to_string();
        let chunk = chunk.clone();
        self.blocking(move |g| g.merge_chunk(&document_id, &chunk)).await
    }

    async fn merge_table(&self, document_id: &str, table: &TableNode) -> Result<()> {
        let document_id = document_id.to_string();
        let table = table.clone();
        self.blocking(move |g| g.merge_table(&document_id, &table)).await
    }

    async fn merge_rows(&self, table_id: &str, rows: &[RowNode]) -> Result<()> {
        let table_id = table_id.to_string();
        let rows = rows.to_vec();
        self.blocking(move |g| g.merge_rows(&table_id, &rows)).await
    }

    async fn merge_mentions(&self, label: NodeLabel, id: &str, concepts: &[String]) -> Result<()> {
        let id = id.to_string();
        let concepts = concepts.to_vec();
        self.blocking(move |g| g.merge_mentions(label, &id, &concepts)).await
    }

    async fn close(&self) -> Result<()> {
        self.blocking(|g| g.close()).await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> ChunkNode {
        ChunkNode {
            id: id.to_string(),
            text: text.to_string(),
            page: 1,
            vector_id: String::new(),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let graph = SqliteGraph::in_memory().unwrap();

        for _ in 0..2 {
            graph.merge_document("report.pdf").unwrap();
            graph.merge_chunk("report.pdf", &chunk("c1", "hello")).unwrap();
            graph
                .merge_mentions(NodeLabel::Chunk, "c1", &["Revenue".to_string(), "Growth".to_string()])
                .unwrap();
        }

        assert_eq!(graph.node_count(NodeLabel::Document).unwrap(), 1);
        assert_eq!(graph.node_count(NodeLabel::Chunk).unwrap(), 1);
        assert_eq!(graph.node_count(NodeLabel::Concept).unwrap(), 2);
        assert_eq!(graph.relationship_count(RelType::Contains).unwrap(), 1);
        assert_eq!(graph.relationship_count(RelType::Mentions).unwrap(), 2);
    }

    #[test]
    fn test_create_only_properties_are_kept() {
        let graph = SqliteGraph::in_memory().unwrap();
        graph.merge_document("doc").unwrap();
        graph.merge_chunk("doc", &chunk("c1", "first")).unwrap();
        graph.merge_chunk("doc", &chunk("c1", "second")).unwrap();

        let props = graph.node_properties(NodeLabel::Chunk, "c1").unwrap().unwrap();
        assert_eq!(props["text"], "first");

        let doc = graph.node_properties(NodeLabel::Document, "doc").unwrap().unwrap();
        assert_eq!(doc["title"], "doc");
    }

    #[test]
    fn test_children_of_missing_parents_are_skipped() {
        let graph = SqliteGraph::in_memory().unwrap();
        graph.merge_chunk("ghost", &chunk("c1", "text")).unwrap();
        graph
            .merge_mentions(NodeLabel::Row, "missing-row", &["Revenue".to_string()])
            .unwrap();

        assert_eq!(graph.node_count(NodeLabel::Chunk).unwrap(), 0);
        assert_eq!(graph.node_count(NodeLabel::Concept).unwrap(), 0);
    }

    #[test]
    fn test_rows_link_to_table() {
        let graph = SqliteGraph::in_memory().unwrap();
        graph.merge_document("data.csv").unwrap();
        graph
            .merge_table(
                "data.csv",
                &TableNode {
                    id: "t1".into(),
                    caption: "cap".into(),
                    markdown: "| a |".into(),
                },
            )
            .unwrap();
        let rows: Vec<RowNode> = (0..3)
            .map(|i| RowNode {
                id: format!("r{}", i),
                index: i,
                data_json: r#"{"a":"1"}"#.into(),
                serialized_text: "a: 1.".into(),
            })
            .collect();
        graph.merge_rows("t1", &rows).unwrap();

        assert_eq!(graph.node_count(NodeLabel::Row).unwrap(), 3);
        assert_eq!(graph.relationship_count(RelType::HasRow).unwrap(), 3);
        let row = graph.node_properties(NodeLabel::Row, "r2").unwrap().unwrap();
        assert_eq!(row["index"], 2);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.merge_document("doc").await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(store.merge_document("doc").await, Err(Error::Store(_))));
    }

    #[test]
    fn test_reopen_file_keeps_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let graph = SqliteGraph::open(&path).unwrap();
        graph.merge_document("a.csv").unwrap();
        graph.close().unwrap();

        let graph = SqliteGraph::open(&path).unwrap();
        graph.merge_document("a.csv").unwrap();
        assert_eq!(graph.node_count(NodeLabel::Document).unwrap(), 1);
    }
}
