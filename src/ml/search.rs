//! Exact cosine similarity search
//!
//! Schemas hold at most a few hundred tables, so every query is ranked by a
//! flat scan. The ordering is exactly the cosine ordering; no approximate
//! structure can reorder neighbours.

use crate::error::{QueryMindError, Result};
use crate::ml::embedding::Embedding;
use serde::{Deserialize, Serialize};

/// Similarity metric an index collection was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity
    Cosine,
}

impl DistanceMetric {
    /// Name stored in collection metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Parse a stored metric name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

/// A ranked neighbour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Position of the candidate in the scanned slice
    pub id: usize,
    /// Cosine similarity, higher is closer
    pub similarity: f32,
}

/// Dot product of two equally sized vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; zero vectors are treated as orthogonal to everything
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product(a, b) / (norm_a * norm_b)
    }
}

/// Rank `candidates` against `query` by descending cosine similarity.
///
/// Ties keep the candidates' original order. Every candidate must have the
/// query's dimensionality.
pub fn rank_by_cosine(query: &Embedding, candidates: &[Embedding], top_k: usize) -> Result<Vec<SearchResult>> {
    let mut scored = Vec::with_capacity(candidates.len());

    for (id, vector) in candidates.iter().enumerate() {
        if vector.len() != query.len() {
            return Err(QueryMindError::Index(format!(
                "Query dimension {} doesn't match index dimension {}",
                query.len(),
                vector.len()
            )));
        }
        scored.push(SearchResult {
            id,
            similarity: cosine_similarity(query, vector),
        });
    }

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(top_k);
    Ok(scored)
}
