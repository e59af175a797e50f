//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "DOCGRAPH_CONFIG";

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ollama/LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,
    /// Concept extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Load configuration: optional TOML file from `DOCGRAPH_CONFIG`, then
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL_NAME") {
            self.llm.model = model;
        }
        if let Some(uri) = lookup("NEO4J_URI") {
            self.graph.neo4j.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USERNAME") {
            self.graph.neo4j.username = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.graph.neo4j.password = password;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.graph.neo4j.database = database;
        }
        if let Some(backend) = lookup("DOCGRAPH_GRAPH_BACKEND") {
            match backend.to_lowercase().as_str() {
                "neo4j" => self.graph.backend = GraphBackend::Neo4j,
                "sqlite" => self.graph.backend = GraphBackend::Sqlite,
                other => tracing::warn!("Ignoring unknown graph backend '{}'", other),
            }
        }
        if let Some(path) = lookup("DOCGRAPH_SQLITE_PATH") {
            self.graph.sqlite_path = PathBuf::from(path);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(Error::Config("llm.base_url must not be empty".to_string()));
        }
        if self.graph.backend == GraphBackend::Neo4j && self.graph.neo4j.uri.trim().is_empty() {
            return Err(Error::Config(
                "graph.backend = neo4j requires NEO4J_URI".to_string(),
            ));
        }
        if self.processing.parallel_files == 0 {
            return Err(Error::Config(
                "processing.parallel_files must be at least 1".to_string(),
            ));
        }
        if self.extraction.max_input_chars == 0 {
            return Err(Error::Config(
                "extraction.max_input_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Which property-graph backend receives the writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// Embedded SQLite property graph
    #[default]
    Sqlite,
    /// Neo4j over the HTTP transactional API
    Neo4j,
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Backend selection
    pub backend: GraphBackend,
    /// Database file for the SQLite backend
    pub sqlite_path: PathBuf,
    /// Neo4j connection settings
    pub neo4j: Neo4jConfig,
    /// Number of retries for failed writes
    pub max_retries: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Sqlite,
            sqlite_path: PathBuf::from("docgraph.db"),
            neo4j: Neo4jConfig::default(),
            max_retries: 2,
        }
    }
}

/// Neo4j HTTP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// HTTP base URI, e.g. `http://localhost:7474`
    pub uri: String,
    pub username: String,
    pub password: String,
    /// Target database name
    pub database: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            username: String::new(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Concept extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Trimmed inputs shorter than this skip the model call
    pub min_input_chars: usize,
    /// Inputs are truncated to this many characters before prompting
    pub max_input_chars: usize,
    /// Upper bound on concepts kept per call
    pub max_concepts: usize,
    /// Run a second extraction pass per table row
    pub extract_row_concepts: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_input_chars: 10,
            max_input_chars: 4000,
            max_concepts: 32,
            extract_row_concepts: true,
        }
    }
}

/// How chunk, table and row ids are assigned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Fresh UUID per unit on every run (append-only ingestion)
    #[default]
    Random,
    /// Ids hashed from source path and unit position
    Stable,
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of files processed concurrently
    pub parallel_files: usize,
    /// Timeout for processing a single file in seconds
    pub file_timeout_secs: u64,
    /// Descend into subdirectories of the input directory
    pub recursive: bool,
    /// Id assignment for child nodes
    pub id_strategy: IdStrategy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_files: 1,
            file_timeout_secs: 600,
            recursive: false,
            id_strategy: IdStrategy::Random,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.extraction.max_input_chars, 4000);
        assert_eq!(config.graph.backend, GraphBackend::Sqlite);
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [processing]
            parallel_files = 4
            id_strategy = "stable"

            [graph]
            backend = "neo4j"
            [graph.neo4j]
            uri = "http://graph:7474"
            "#,
        )
        .unwrap();

        assert_eq!(config.processing.parallel_files, 4);
        assert_eq!(config.processing.id_strategy, IdStrategy::Stable);
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.neo4j.database, "neo4j");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
            ("NEO4J_URI", "http://db:7474"),
            ("NEO4J_USERNAME", "neo4j"),
            ("DOCGRAPH_GRAPH_BACKEND", "Neo4j"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.base_url, "http://gpu-box:11434");
        assert_eq!(config.graph.neo4j.uri, "http://db:7474");
        assert_eq!(config.graph.neo4j.username, "neo4j");
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = PipelineConfig::default();
        config.graph.backend = GraphBackend::Neo4j;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.processing.parallel_files = 0;
        assert!(config.validate().is_err());
    }
}
