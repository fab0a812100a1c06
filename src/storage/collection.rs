//! SQLite-backed embedding collection
//!
//! One collection file holds every (content, table name, embedding) entry for a
//! single index identity, together with the metric, model and dimensionality it
//! was created with.

use crate::error::{QueryMindError, Result};
use crate::ml::search::DistanceMetric;
use crate::storage::schema::*;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::path::Path;

/// Creation-time settings of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMetadata {
    pub metric: DistanceMetric,
    pub dimension: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

/// An entry as written to or read from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub table_name: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Connection to one identity's collection file
pub struct Collection {
    conn: Connection,
}

impl Collection {
    /// Create a fresh collection and record its metadata.
    ///
    /// Any tables already present in the file are dropped first.
    pub fn create<P: AsRef<Path>>(path: P, metadata: &CollectionMetadata) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| QueryMindError::Storage(format!("Failed to create collection: {}", e)))?;

        conn.execute_batch(DROP_COLLECTION_TABLES)
            .map_err(|e| QueryMindError::Storage(format!("Failed to reset collection: {}", e)))?;
        conn.execute_batch(CREATE_ENTRIES_TABLE)
            .map_err(|e| QueryMindError::Storage(format!("Failed to create entries table: {}", e)))?;
        conn.execute_batch(CREATE_METADATA_TABLE)
            .map_err(|e| QueryMindError::Storage(format!("Failed to create metadata table: {}", e)))?;

        let collection = Self { conn };
        collection.set_meta(META_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        collection.set_meta(META_METRIC, metadata.metric.as_str())?;
        collection.set_meta(META_DIMENSION, &metadata.dimension.to_string())?;
        collection.set_meta(META_EMBEDDING_MODEL, &metadata.embedding_model)?;
        collection.set_meta(META_CREATED_AT, &metadata.created_at.to_rfc3339())?;

        log::debug!(
            "Created {} collection at {:?} (dimension {})",
            metadata.metric.as_str(),
            path.as_ref(),
            metadata.dimension
        );
        Ok(collection)
    }

    /// Open an existing collection.
    ///
    /// `None` when no collection file exists or it was written with another
    /// collection schema version.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| QueryMindError::Storage(format!("Failed to open collection: {}", e)))?;

        let has_entries: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'entries'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if has_entries.is_none() {
            return Ok(None);
        }

        let collection = Self { conn };
        let version = collection.get_meta(META_SCHEMA_VERSION).ok();
        if version.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
            log::warn!(
                "Ignoring collection at {:?} with schema version {:?}, expected {}",
                path,
                version,
                SCHEMA_VERSION
            );
            return Ok(None);
        }

        Ok(Some(collection))
    }

    /// Insert entries in a single transaction
    pub fn insert_entries(&mut self, entries: &[StoredEntry]) -> Result<()> {
        let dimension = self.metadata()?.dimension;
        let tx = self
            .conn
            .transaction()
            .map_err(|e| QueryMindError::Storage(format!("Failed to start transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare("INSERT INTO entries (id, table_name, content, embedding) VALUES (?, ?, ?, ?)")
                .map_err(|e| QueryMindError::Storage(format!("Failed to prepare statement: {}", e)))?;

            for (id, entry) in entries.iter().enumerate() {
                if entry.embedding.len() != dimension {
                    return Err(QueryMindError::Index(format!(
                        "Embedding for {} has dimension {}, collection expects {}",
                        entry.table_name,
                        entry.embedding.len(),
                        dimension
                    )));
                }

                stmt.execute(params![
                    id as i64,
                    entry.table_name,
                    entry.content,
                    encode_embedding(&entry.embedding),
                ])
                .map_err(|e| QueryMindError::Storage(format!("Failed to insert entry {}: {}", id, e)))?;
            }
        }

        tx.commit()
            .map_err(|e| QueryMindError::Storage(format!("Failed to commit transaction: {}", e)))?;

        log::info!("Inserted {} entries into collection", entries.len());
        Ok(())
    }

    /// Number of stored entries
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| QueryMindError::Storage(format!("Failed to count entries: {}", e)))?;

        Ok(count as usize)
    }

    /// All entries in insertion order
    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name, content, embedding FROM entries ORDER BY id")
            .map_err(|e| QueryMindError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_entry)
            .map_err(|e| QueryMindError::Storage(format!("Failed to read entries: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| QueryMindError::Storage(format!("Failed to process entry row: {}", e)))?);
        }
        Ok(entries)
    }

    /// Creation-time metadata
    pub fn metadata(&self) -> Result<CollectionMetadata> {
        let metric_name = self.get_meta(META_METRIC)?;
        let metric = DistanceMetric::parse(&metric_name)
            .ok_or_else(|| QueryMindError::Storage(format!("Unknown metric '{}'", metric_name)))?;

        let dimension = self
            .get_meta(META_DIMENSION)?
            .parse::<usize>()
            .map_err(|e| QueryMindError::Storage(format!("Invalid dimension: {}", e)))?;

        let created_at = DateTime::parse_from_rfc3339(&self.get_meta(META_CREATED_AT)?)
            .map_err(|e| QueryMindError::Storage(format!("Invalid creation time: {}", e)))?
            .with_timezone(&Utc);

        Ok(CollectionMetadata {
            metric,
            dimension,
            embedding_model: self.get_meta(META_EMBEDDING_MODEL)?,
            created_at,
        })
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .map_err(|e| QueryMindError::Storage(format!("Failed to write metadata {}: {}", key, e)))?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<String> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| QueryMindError::Storage(format!("Failed to read metadata {}: {}", key, e)))?
            .ok_or_else(|| QueryMindError::Storage(format!("Missing metadata key {}", key)))
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<StoredEntry> {
    let blob: Vec<u8> = row.get(2)?;
    Ok(StoredEntry {
        table_name: row.get(0)?,
        content: row.get(1)?,
        embedding: decode_embedding(&blob),
    })
}

/// Little-endian f32 encoding of an embedding
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_embedding`]
pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
