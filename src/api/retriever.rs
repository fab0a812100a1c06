//! ContextRetriever - schema context for a question
//!
//! Retrieval never raises for expected failures. Its outcome is a
//! [`SchemaContext`] whose text form keeps the in-band sentinels callers match
//! on: `"ERROR:"` for an index that must be rebuilt, a plain sentence for
//! "nothing relevant", and `"Error retrieving schema context:"` for anything
//! else.

use crate::ml::{EmbeddingIndex, EmbeddingProvider, IndexHit, IndexIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix signalling a missing or empty index
pub const INDEX_UNAVAILABLE_PREFIX: &str = "ERROR:";

/// Text returned for an index that must be rebuilt
pub const SCHEMA_NOT_INDEXED: &str =
    "ERROR: Schema not indexed. Please log out and log in again to re-index the database schema.";

/// Text returned when the index answered with no neighbours
pub const NO_RELEVANT_TABLES: &str = "No relevant tables found in the database schema.";

/// Prefix of unexpected retrieval failures
pub const RETRIEVAL_ERROR_PREFIX: &str = "Error retrieving schema context:";

/// Default number of tables retrieved per question
pub const DEFAULT_TOP_K: usize = 5;

/// Outcome of a retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaContext {
    /// Ranked tables, most similar first
    Found(Vec<IndexHit>),
    /// The index exists but returned nothing
    NoRelevantTables,
    /// The index is missing or empty and must be rebuilt
    IndexUnavailable,
    /// Any other failure; terminal for the request
    Failed(String),
}

impl SchemaContext {
    /// In-band text form handed to the generator
    pub fn text(&self) -> String {
        match self {
            SchemaContext::Found(hits) => hits
                .iter()
                .map(|hit| format!("-- Table: {}\n{}", hit.table_name, hit.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
            SchemaContext::NoRelevantTables => NO_RELEVANT_TABLES.to_string(),
            SchemaContext::IndexUnavailable => SCHEMA_NOT_INDEXED.to_string(),
            SchemaContext::Failed(reason) => format!("{} {}", RETRIEVAL_ERROR_PREFIX, reason),
        }
    }

    /// True when a rebuild-and-retry may recover
    pub fn needs_rebuild(&self) -> bool {
        self.text().starts_with(INDEX_UNAVAILABLE_PREFIX)
    }

    /// Names of the retrieved tables
    pub fn table_names(&self) -> Vec<&str> {
        match self {
            SchemaContext::Found(hits) => hits.iter().map(|h| h.table_name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Retrieves the schema tables most relevant to a question
#[derive(Clone)]
pub struct ContextRetriever {
    index: EmbeddingIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl ContextRetriever {
    /// Create a retriever over `index` using `embedder` for questions
    pub fn new(index: EmbeddingIndex, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set the number of tables returned per question
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// The index this retriever queries
    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// The embedding provider shared with index builds
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Retrieve context for `question` from `identity`'s index
    pub async fn retrieve(&self, question: &str, identity: &IndexIdentity) -> SchemaContext {
        self.retrieve_top_k(question, identity, self.top_k).await
    }

    /// Retrieve at most `top_k` tables
    pub async fn retrieve_top_k(&self, question: &str, identity: &IndexIdentity, top_k: usize) -> SchemaContext {
        log::info!("Retrieving schema context for {} (top {})", identity, top_k);

        let question_embedding = match self.embedder.embed_one(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                log::error!("Error in retrieve: {}", e);
                return SchemaContext::Failed(e.to_string());
            }
        };

        match self
            .index
            .query(identity, self.embedder.model_name(), &question_embedding, top_k)
        {
            Ok(hits) if hits.is_empty() => SchemaContext::NoRelevantTables,
            Ok(hits) => {
                log::debug!(
                    "Retrieved tables: {:?}",
                    hits.iter().map(|h| h.table_name.as_str()).collect::<Vec<_>>()
                );
                SchemaContext::Found(hits)
            }
            Err(e) if e.is_index_unavailable() => {
                log::warn!("Schema needs to be re-indexed: {}", e);
                SchemaContext::IndexUnavailable
            }
            Err(e) => {
                log::error!("Error in retrieve: {}", e);
                SchemaContext::Failed(e.to_string())
            }
        }
    }
}
