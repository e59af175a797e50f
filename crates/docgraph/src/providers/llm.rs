//! LLM provider trait used for concept extraction

use async_trait::async_trait;

use crate::error::Result;

/// Trait for JSON-constrained text generation
///
/// Implementations:
/// - `OllamaClient`: local Ollama server (llama3.1 by default)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send `prompt` and return the raw model output, which the model was
    /// instructed to format as a single JSON object
    async fn generate_json(&self, prompt: &str) -> Result<String>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}
