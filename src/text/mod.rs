//! Schema text processing for querymind-rs
//!
//! This module turns raw schema dumps into the per-table chunks that get embedded.

pub mod chunking;

// Re-export main types and functions
pub use chunking::{FULL_SCHEMA_CHUNK, SchemaChunk, SchemaChunker};
