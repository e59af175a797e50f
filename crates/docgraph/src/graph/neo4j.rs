//! Neo4j backend over the HTTP transactional Cypher endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Neo4jConfig;
use crate::error::{is_retryable_request, is_retryable_status, Error, Result};
use crate::retry::{with_backoff, RetryPolicy};

use super::store::{ChunkNode, GraphStore, NodeLabel, RowNode, TableNode};

/// Neo4j marks retryable failures (deadlocks, leader switches) with a
/// `Neo.TransientError.*` status code
fn cypher_error(code: &str, message: &str) -> Error {
    let message = format!("{}: {}", code, message);
    if code.starts_with("Neo.TransientError.") {
        Error::unavailable(message)
    } else {
        Error::store(message)
    }
}

/// One parameterized Cypher statement
#[derive(Debug, Clone, Serialize)]
pub struct CypherStatement {
    pub statement: String,
    pub parameters: Value,
}

impl CypherStatement {
    fn new(statement: &str, parameters: Value) -> Self {
        Self {
            statement: statement.trim().to_string(),
            parameters,
        }
    }
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: &'a [CypherStatement],
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

/// Merge the `Document` node keyed by source path
pub fn document_statement(source: &str) -> CypherStatement {
    CypherStatement::new(
        r#"
        MERGE (d:Document {id: $source})
        ON CREATE SET d.created_at = timestamp(), d.title = $source
        "#,
        json!({ "source": source }),
    )
}

/// Merge a chunk under its document
pub fn chunk_statement(document_id: &str, chunk: &ChunkNode) -> CypherStatement {
    CypherStatement::new(
        r#"
        MATCH (d:Document {id: $doc_source})
        MERGE (c:Chunk {id: $chunk_id})
        ON CREATE SET c.text = $text, c.vector_id = $vector_id, c.page = $page
        MERGE (d)-[:CONTAINS]->(c)
        "#,
        json!({
            "doc_source": document_id,
            "chunk_id": chunk.id,
            "text": chunk.text,
            "vector_id": chunk.vector_id,
            "page": chunk.page,
        }),
    )
}

/// Merge a table under its document
pub fn table_statement(document_id: &str, table: &TableNode) -> CypherStatement {
    CypherStatement::new(
        r#"
        MATCH (d:Document {id: $doc_source})
        MERGE (t:Table {id: $table_id})
        ON CREATE SET t.caption = $caption, t.markdown = $markdown
        MERGE (d)-[:CONTAINS]->(t)
        "#,
        json!({
            "doc_source": document_id,
            "table_id": table.id,
            "caption": table.caption,
            "markdown": table.markdown,
        }),
    )
}

/// Batch-merge rows under their table
pub fn rows_statement(table_id: &str, rows: &[RowNode]) -> CypherStatement {
    let rows: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "index": r.index,
                "data": r.data_json,
                "serialized_text": r.serialized_text,
            })
        })
        .collect();

    CypherStatement::new(
        r#"
        MATCH (t:Table {id: $table_id})
        UNWIND $rows AS row_data
        MERGE (r:Row {id: row_data.id})
        ON CREATE SET r.index = row_data.index, r.data_json = row_data.data, r.serialized_text = row_data.serialized_text
        MERGE (t)-[:HAS_ROW]->(r)
        "#,
        json!({ "table_id": table_id, "rows": rows }),
    )
}

/// Merge concepts and `MENTIONS` edges from a chunk, table or row
pub fn mentions_statement(label: NodeLabel, id: &str, concepts: &[String]) -> CypherStatement {
    let statement = format!(
        r#"
        MATCH (n:{} {{id: $node_id}})
        UNWIND $concepts AS concept_name
        MERGE (con:Concept {{name: concept_name}})
        MERGE (n)-[:MENTIONS]->(con)
        "#,
        label.as_str()
    );
    CypherStatement::new(&statement, json!({ "node_id": id, "concepts": concepts }))
}

/// Neo4j graph store speaking Cypher over HTTP
pub struct Neo4jStore {
    client: Client,
    commit_url: String,
    config: Neo4jConfig,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl Neo4jStore {
    pub fn new(config: &Neo4jConfig, max_retries: u32) -> Result<Self> {
        if config.uri.trim().is_empty() {
            return Err(Error::Config("Neo4j URI is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let commit_url = format!(
            "{}/db/{}/tx/commit",
            config.uri.trim_end_matches('/'),
            config.database
        );
        tracing::info!("Neo4j store targeting {}", commit_url);

        Ok(Self {
            client,
            commit_url,
            config: config.clone(),
            retry: RetryPolicy::new(max_retries),
            closed: AtomicBool::new(false),
        })
    }

    /// Run statements in one auto-committed transaction
    pub async fn run(&self, statements: &[CypherStatement]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::store("Graph store is closed"));
        }
        with_backoff(self.retry, "Neo4j commit", || self.commit(statements)).await
    }

    async fn commit(&self, statements: &[CypherStatement]) -> Result<()> {
        let mut request = self
            .client
            .post(&self.commit_url)
            .json(&CommitRequest { statements });
        if !self.config.username.is_empty() {
            request = request.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                let message = format!("Neo4j request failed: {}", e);
                if is_retryable_request(&e) {
                    Error::unavailable(message)
                } else {
                    Error::store(message)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("Neo4j commit failed: HTTP {} - {}", status, body);
            return Err(if is_retryable_status(status) {
                Error::unavailable(message)
            } else {
                Error::store(message)
            });
        }

        let body: CommitResponse = response
            .json()
            .await
            .map_err(|e| Error::store(format!("Failed to parse Neo4j response: {}", e)))?;

        if let Some(err) = body.errors.first() {
            return Err(cypher_error(&err.code, &err.message));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn merge_document(&self, id: &str) -> Result<()> {
        self.run(&[document_statement(id)]).await
    }

    async fn merge_chunk(&self, document_id: &str, chunk: &ChunkNode) -> Result<()> {
        self.run(&[chunk_statement(document_id, chunk)]).await
    }

    async fn merge_table(&self, document_id: &str, table: &TableNode) -> Result<()> {
        self.run(&[table_statement(document_id, table)]).await
    }

    async fn merge_rows(&self, table_id: &str, rows: &[RowNode]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.run(&[rows_statement(table_id, rows)]).await
    }

    async fn merge_mentions(&self, label: NodeLabel, id: &str, concepts: &[String]) -> Result<()> {
        if concepts.is_empty() {
            return Ok(());
        }
        self.run(&[mentions_statement(label, id, concepts)]).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}
