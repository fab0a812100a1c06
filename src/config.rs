//! Configuration for querymind-rs
//!
//! Settings are grouped per concern. Every section has a `Default` so a bare
//! `Config::default()` talks to a local Ollama instance and keeps its indexes
//! under `./.querymind_index`.

use crate::error::{QueryMindError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding and completion model settings
    pub models: ModelConfig,
    /// Retrieval settings
    pub retrieval: RetrievalConfig,
    /// Index storage settings
    pub storage: StorageConfig,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding model name (fixes the embedding dimensionality)
    pub embedding_model: String,
    /// Chat model used for SQL generation
    pub completion_model: String,
    /// Base URL of the Ollama server used for embeddings
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible chat API
    pub api_base: String,
    /// API key for the chat API (empty for local Ollama)
    pub api_key: String,
    /// HTTP timeout applied by the provider clients
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_model: "mxbai-embed-large:latest".to_string(),
            completion_model: "llama3.1:8b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            api_base: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            request_timeout_secs: 120,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of schema chunks handed to the model
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one collection per index identity
    pub index_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_root: PathBuf::from("./.querymind_index"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUERYMIND_*` environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("QUERYMIND_EMBEDDING_MODEL") {
            self.models.embedding_model = value;
        }
        if let Ok(value) = std::env::var("QUERYMIND_COMPLETION_MODEL") {
            self.models.completion_model = value;
        }
        if let Ok(value) = std::env::var("QUERYMIND_OLLAMA_URL") {
            self.models.ollama_url = value;
        }
        if let Ok(value) = std::env::var("QUERYMIND_API_BASE") {
            self.models.api_base = value;
        }
        if let Ok(value) = std::env::var("QUERYMIND_API_KEY") {
            self.models.api_key = value;
        }
        if let Ok(value) = std::env::var("QUERYMIND_INDEX_ROOT") {
            self.storage.index_root = PathBuf::from(value);
        }
        self
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(QueryMindError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.models.embedding_model.trim().is_empty() {
            return Err(QueryMindError::Config("models.embedding_model is empty".to_string()));
        }
        if self.models.completion_model.trim().is_empty() {
            return Err(QueryMindError::Config("models.completion_model is empty".to_string()));
        }
        Ok(())
    }
}
