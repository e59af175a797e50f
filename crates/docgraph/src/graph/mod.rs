//! Property-graph output: store backends and the unit-to-graph connector

mod connector;
mod neo4j;
mod sqlite;
mod store;

pub use connector::{GraphConnector, UNKNOWN_SOURCE};
pub use neo4j::{CypherStatement, Neo4jStore};
pub use sqlite::{SqliteGraph, SqliteGraphStore};
pub use store::{ChunkNode, GraphStore, NodeLabel, RelType, RowNode, TableNode};

use std::sync::Arc;

use crate::config::{GraphBackend, GraphConfig};
use crate::error::Result;

/// Open the configured graph backend
pub fn open_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.backend {
        GraphBackend::Sqlite => {
            tracing::info!("Opening SQLite graph at {}", config.sqlite_path.display());
            Arc::new(SqliteGraphStore::open(&config.sqlite_path)?)
        }
        GraphBackend::Neo4j => Arc::new(Neo4jStore::new(&config.neo4j, config.max_retries)?),
    };
    Ok(store)
}
