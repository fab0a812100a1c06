//! Embedding providers
//!
//! The pipeline treats the embedding model as a black box behind
//! [`EmbeddingProvider`]: one vector per input text, order preserved, fixed
//! dimensionality per model. [`OllamaEmbedder`] talks to Ollama's `/api/embed`.

use crate::config::ModelConfig;
use crate::error::{QueryMindError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Source of embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text in a single batched call, preserving order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Name of the model, recorded alongside an index
    fn model_name(&self) -> &str;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| QueryMindError::Embedding("Provider returned no embedding".to_string()))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

/// Embeddings served by an Ollama instance
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    /// Create a new embedder for the configured model and server
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        log::info!(
            "Ollama embedder ready: model {} at {}",
            config.embedding_model,
            config.ollama_url
        );

        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryMindError::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(QueryMindError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        log::debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(parsed.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let input = vec!["users".to_string(), "orders".to_string()];
        let body = serde_json::to_value(EmbedRequest {
            model: "mxbai-embed-large:latest",
            input: &input,
        })
        .unwrap();

        assert_eq!(body["model"], "mxbai-embed-large:latest");
        assert_eq!(body["input"][1], "orders");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ModelConfig {
            ollama_url: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.model_name(), "mxbai-embed-large:latest");
    }
}
