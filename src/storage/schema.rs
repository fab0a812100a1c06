//! Collection schema definitions

/// Collection schema version
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the collection inside an identity's directory
pub const COLLECTION_FILE: &str = "db_schema.sqlite";

/// SQL for creating the entries table
pub const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    table_name TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL
);
"#;

/// SQL for creating the collection metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQL for discarding a previous collection living in the same file
pub const DROP_COLLECTION_TABLES: &str = r#"
DROP TABLE IF EXISTS entries;
DROP TABLE IF EXISTS metadata;
"#;

/// Metadata keys
pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_METRIC: &str = "metric";
pub const META_DIMENSION: &str = "dimension";
pub const META_EMBEDDING_MODEL: &str = "embedding_model";
pub const META_CREATED_AT: &str = "created_at";
