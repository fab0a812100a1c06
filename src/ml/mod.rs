//! Embedding and vector retrieval for querymind-rs
//!
//! This module provides the embedding provider seam, exact cosine ranking and
//! the per-identity schema index built on top of them.

pub mod embedding;
pub mod index;
pub mod search;

// Re-export main types and functions
pub use embedding::{Embedding, EmbeddingProvider, OllamaEmbedder};
pub use index::{EmbeddingIndex, IndexBuildReport, IndexHit, IndexIdentity, IndexStats};
pub use search::{DistanceMetric, SearchResult, cosine_similarity, rank_by_cosine};
