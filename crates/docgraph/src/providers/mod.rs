//! Provider abstractions for the language model behind concept extraction

pub mod llm;
pub mod ollama;

pub use llm::LlmProvider;
pub use ollama::OllamaClient;

#[cfg(test)]
pub use llm::MockLlmProvider;
