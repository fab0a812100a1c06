//! Per-identity embedding index
//!
//! Every database connection gets its own collection under the index root,
//! in a directory named after its [`IndexIdentity`]. Building replaces the
//! whole collection; querying ranks every entry by exact cosine similarity.

use crate::error::{QueryMindError, Result};
use crate::ml::embedding::{Embedding, EmbeddingProvider};
use crate::ml::search::{DistanceMetric, rank_by_cosine};
use crate::storage::{COLLECTION_FILE, Collection, CollectionMetadata, StoredEntry};
use crate::text::SchemaChunk;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Hex characters kept from the identity hash
const IDENTITY_LEN: usize = 8;

/// Stable key isolating one user/host/database combination's index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexIdentity(String);

impl IndexIdentity {
    /// Derive the identity of a connection. Not a security boundary.
    pub fn derive(user: &str, host: &str, database: &str) -> Self {
        let digest = Sha256::digest(format!("{}_{}_{}", user, host, database).as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..IDENTITY_LEN].to_string())
    }

    /// The identity key, also used as the collection directory name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of an index build.
///
/// Building never fails the caller's flow; a failure is carried here and the
/// next retrieval detects the unusable index on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexBuildReport {
    /// Number of chunks stored
    pub chunks_indexed: usize,
    /// Table names in index order
    pub tables: Vec<String>,
    /// Non-fatal problems, such as an old collection that could not be removed
    pub warnings: Vec<String>,
    /// Why the build did not complete, if it did not
    pub failure: Option<String>,
    /// Wall-clock build time in seconds
    pub elapsed_secs: f64,
}

impl IndexBuildReport {
    /// True when the collection was fully written
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A neighbour returned by [`EmbeddingIndex::query`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub table_name: String,
    pub content: String,
    pub similarity: f32,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub identity: IndexIdentity,
    pub entries: usize,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub embedding_model: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Embedding index rooted at a storage directory
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    root: PathBuf,
}

impl EmbeddingIndex {
    /// Create an index manager storing collections under `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the collection for `identity`
    pub fn collection_dir(&self, identity: &IndexIdentity) -> PathBuf {
        self.root.join(identity.as_str())
    }

    fn collection_path(&self, identity: &IndexIdentity) -> PathBuf {
        self.collection_dir(identity).join(COLLECTION_FILE)
    }

    /// Replace the collection for `identity` with `chunks`.
    ///
    /// All chunk contents are embedded in one call. Errors are logged and
    /// reported, never returned.
    pub async fn build(
        &self,
        identity: &IndexIdentity,
        chunks: &[SchemaChunk],
        embedder: &dyn EmbeddingProvider,
    ) -> IndexBuildReport {
        let start = Instant::now();
        let mut report = IndexBuildReport::default();

        if let Err(e) = self.clear(identity) {
            log::warn!("Could not clear old index for {}: {}", identity, e);
            report.warnings.push(format!("old collection not removed: {}", e));
        }

        match self.write_collection(identity, chunks, embedder).await {
            Ok(tables) => {
                log::info!("Schema indexed for {}: {} tables", identity, tables.len());
                report.chunks_indexed = tables.len();
                report.tables = tables;
            }
            Err(e) => {
                log::error!("Indexing failed for {}: {}", identity, e);
                report.failure = Some(e.to_string());
            }
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        report
    }

    async fn write_collection(
        &self,
        identity: &IndexIdentity,
        chunks: &[SchemaChunk],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<String>> {
        std::fs::create_dir_all(self.collection_dir(identity))?;
        log::info!("Indexing schema at {:?}", self.collection_dir(identity));

        if chunks.is_empty() {
            return Err(QueryMindError::Chunking("No schema chunks found".to_string()));
        }
        for chunk in chunks {
            log::debug!("Table chunk: {}", chunk.name);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(QueryMindError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(QueryMindError::Embedding("Provider returned empty vectors".to_string()));
        }

        let metadata = CollectionMetadata {
            metric: DistanceMetric::Cosine,
            dimension,
            embedding_model: embedder.model_name().to_string(),
            created_at: chrono::Utc::now(),
        };
        let mut collection = Collection::create(self.collection_path(identity), &metadata)?;

        let entries: Vec<StoredEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredEntry {
                table_name: chunk.name.clone(),
                content: chunk.content.clone(),
                embedding,
            })
            .collect();
        collection.insert_entries(&entries)?;

        Ok(chunks.iter().map(|c| c.name.clone()).collect())
    }

    /// Nearest entries to `query_embedding`, most similar first, at most `top_k`.
    ///
    /// Fails with [`QueryMindError::IndexUnavailable`] when the collection is
    /// missing or empty, or was built with a different embedding model than
    /// `embedding_model`.
    pub fn query(
        &self,
        identity: &IndexIdentity,
        embedding_model: &str,
        query_embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<IndexHit>> {
        let collection = Collection::open_existing(self.collection_path(identity))?.ok_or_else(|| {
            QueryMindError::IndexUnavailable(format!("no collection for {}", identity))
        })?;

        if collection.count()? == 0 {
            return Err(QueryMindError::IndexUnavailable(format!("collection for {} is empty", identity)));
        }

        let metadata = collection.metadata()?;
        if metadata.embedding_model != embedding_model || query_embedding.len() != metadata.dimension {
            return Err(QueryMindError::IndexUnavailable(format!(
                "collection for {} was built with {} ({} dimensions), query uses {} ({} dimensions)",
                identity,
                metadata.embedding_model,
                metadata.dimension,
                embedding_model,
                query_embedding.len()
            )));
        }

        let entries = collection.entries()?;
        let vectors: Vec<Embedding> = entries.iter().map(|e| e.embedding.clone()).collect();
        let ranked = rank_by_cosine(query_embedding, &vectors, top_k)?;

        Ok(ranked
            .into_iter()
            .map(|result| {
                let entry = &entries[result.id];
                IndexHit {
                    table_name: entry.table_name.clone(),
                    content: entry.content.clone(),
                    similarity: result.similarity,
                }
            })
            .collect())
    }

    /// Remove the collection for `identity`; returns whether one existed
    pub fn invalidate(&self, identity: &IndexIdentity) -> Result<bool> {
        let existed = self.collection_dir(identity).exists();
        self.clear(identity)?;
        if existed {
            log::info!("Invalidated index for {}", identity);
        }
        Ok(existed)
    }

    /// Statistics for `identity`'s collection, if it exists
    pub fn stats(&self, identity: &IndexIdentity) -> Result<Option<IndexStats>> {
        let Some(collection) = Collection::open_existing(self.collection_path(identity))? else {
            return Ok(None);
        };

        let metadata = collection.metadata()?;
        Ok(Some(IndexStats {
            identity: identity.clone(),
            entries: collection.count()?,
            dimension: metadata.dimension,
            metric: metadata.metric,
            embedding_model: metadata.embedding_model,
            created_at: metadata.created_at,
        }))
    }

    fn clear(&self, identity: &IndexIdentity) -> Result<()> {
        let dir = self.collection_dir(identity);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            log::debug!("Cleared old collection at {:?}", dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_deterministic() {
        let a = IndexIdentity::derive("alice", "localhost", "shop");
        let b = IndexIdentity::derive("alice", "localhost", "shop");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), IDENTITY_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_separates_connections() {
        let a = IndexIdentity::derive("alice", "localhost", "shop");
        assert_ne!(a, IndexIdentity::derive("bob", "localhost", "shop"));
        assert_ne!(a, IndexIdentity::derive("alice", "db.internal", "shop"));
        assert_ne!(a, IndexIdentity::derive("alice", "localhost", "crm"));
    }

    #[test]
    fn test_query_without_collection_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path());
        let identity = IndexIdentity::derive("u", "h", "d");

        let err = index.query(&identity, "test-embed", &vec![1.0, 0.0], 5).unwrap_err();
        assert!(err.is_index_unavailable());
        assert!(index.stats(&identity).unwrap().is_none());
    }

    #[test]
    fn test_query_with_other_embedding_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path());
        let identity = IndexIdentity::derive("u", "h", "d");

        std::fs::create_dir_all(index.collection_dir(&identity)).unwrap();
        let metadata = CollectionMetadata {
            metric: DistanceMetric::Cosine,
            dimension: 2,
            embedding_model: "test-embed".to_string(),
            created_at: chrono::Utc::now(),
        };
        let mut collection = Collection::create(index.collection_path(&identity), &metadata).unwrap();
        collection
            .insert_entries(&[StoredEntry {
                table_name: "users".into(),
                content: "CREATE TABLE users (id int);".into(),
                embedding: vec![1.0, 0.0],
            }])
            .unwrap();

        let hits = index.query(&identity, "test-embed", &vec![1.0, 0.0], 5).unwrap();
        assert_eq!(hits[0].table_name, "users");

        let err = index.query(&identity, "other-embed", &vec![1.0, 0.0], 5).unwrap_err();
        assert!(err.is_index_unavailable());
        let err = index.query(&identity, "test-embed", &vec![1.0, 0.0, 0.0], 5).unwrap_err();
        assert!(err.is_index_unavailable());
    }

    #[test]
    fn test_collection_dir_uses_identity() {
        let index = EmbeddingIndex::new("/var/lib/querymind");
        let identity = IndexIdentity::derive("u", "h", "d");
        assert_eq!(
            index.collection_dir(&identity),
            PathBuf::from("/var/lib/querymind").join(identity.as_str())
        );
    }
}
