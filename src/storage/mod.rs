//! Storage functionality for querymind-rs
//!
//! This module persists embedding collections using embedded SQLite, one
//! collection file per index identity.

pub mod collection;
pub mod schema;

// Re-export main types
pub use collection::{Collection, CollectionMetadata, StoredEntry};
pub use schema::COLLECTION_FILE;
