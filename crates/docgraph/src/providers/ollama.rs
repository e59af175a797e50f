//! Ollama client for JSON-mode generation with retry logic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{is_retryable_request, is_retryable_status, Error, Result};
use crate::retry::{with_backoff, RetryPolicy};

use super::llm::LlmProvider;

/// Ollama API client with automatic retry
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client with retry support
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(config.max_retries),
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_once(&self, url: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let message = format!("Generation request failed: {}", e);
                if is_retryable_request(&e) {
                    Error::unavailable(message)
                } else {
                    Error::model(message)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("Generation failed: HTTP {} - {}", status, body);
            return Err(if is_retryable_status(status) {
                Error::unavailable(message)
            } else {
                Error::model(message)
            });
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::model(format!("Failed to parse generation response: {}", e)))?;

        Ok(generate_response.response)
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        tracing::debug!("Generating with model {} ({} prompt chars)", self.config.model, prompt.len());

        with_backoff(self.retry, "Ollama generation", || self.generate_once(&url, prompt)).await
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
