//! Schema chunking
//!
//! Splits a schema dump (a sequence of `CREATE TABLE` statements) into one
//! chunk per table so each table can be embedded and retrieved on its own.

use crate::error::{QueryMindError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Chunk name used when no table statement could be recognised
pub const FULL_SCHEMA_CHUNK: &str = "full_schema";

/// One semantic unit of the schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaChunk {
    /// Table identifier, or [`FULL_SCHEMA_CHUNK`]
    pub name: String,

    /// Verbatim statement text, a substring of the input schema
    pub content: String,
}

/// Splits schema text into per-table chunks
pub struct SchemaChunker {
    table_regex: Regex,
}

impl SchemaChunker {
    /// Create a new chunker
    pub fn new() -> Result<Self> {
        // Name is bare, `backticked`, "double quoted" or [bracketed]
        let table_regex = Regex::new(
            r#"(?is)CREATE TABLE\s+(?:IF NOT EXISTS\s+)?(?:`([^`]+)`|"([^"]+)"|\[([^\]]+)\]|(\w+))\s*\((.*?)\)[^;]*;"#,
        )
        .map_err(|e| QueryMindError::Chunking(format!("Failed to compile table regex: {}", e)))?;

        Ok(Self { table_regex })
    }

    /// Chunk schema text in order of appearance.
    ///
    /// Empty input yields no chunks. Non-empty input without any recognisable
    /// table statement yields a single [`FULL_SCHEMA_CHUNK`] chunk holding the
    /// whole text, so an index is never built from nothing.
    pub fn chunk(&self, schema_text: &str) -> Vec<SchemaChunk> {
        let mut chunks: Vec<SchemaChunk> = self
            .table_regex
            .captures_iter(schema_text)
            .filter_map(|caps| {
                let statement = caps.get(0)?;
                let name = (1..=4).find_map(|i| caps.get(i))?;
                Some(SchemaChunk {
                    name: name.as_str().to_string(),
                    content: statement.as_str().trim().to_string(),
                })
            })
            .collect();

        if chunks.is_empty() && !schema_text.is_empty() {
            log::debug!("No CREATE TABLE statements matched, falling back to a single chunk");
            chunks.push(SchemaChunk {
                name: FULL_SCHEMA_CHUNK.to_string(),
                content: schema_text.to_string(),
            });
        }

        chunks
    }
}
