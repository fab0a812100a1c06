//! Database collaborators
//!
//! The pipeline never owns a database connection. It talks to the queried
//! database through [`SchemaSource`] (schema dump, table listing, column
//! metadata) and [`QueryExecutor`] (running a validated SELECT).
//! [`SqliteDatabase`] implements both for SQLite files.

pub mod sqlite;

use crate::error::Result;
use crate::ml::IndexIdentity;
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteDatabase;

/// Who is connected to which database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub user: String,
    pub host: String,
    pub database: String,
}

impl ConnectionInfo {
    pub fn new(user: impl Into<String>, host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            database: database.into(),
        }
    }

    /// Index identity of this connection
    pub fn identity(&self) -> IndexIdentity {
        IndexIdentity::derive(&self.user, &self.host, &self.database)
    }
}

/// Schema dump of a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedSchema {
    /// Every table's definition statement, each terminated by `;` and a blank line
    pub schema_text: String,
    /// Table names in dump order
    pub table_names: Vec<String>,
}

/// Column metadata of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub column: String,
    pub data_type: String,
    pub nullable: bool,
    /// Key marker, `"PRI"` for primary key columns, `"-"` otherwise
    pub key: String,
    /// Default expression, `"-"` when none
    pub default: String,
}

/// Tabular result of a SELECT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    NoRecords,
}

impl QueryOutcome {
    /// Number of returned rows
    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows { rows, .. } => rows.len(),
            QueryOutcome::NoRecords => 0,
        }
    }
}

/// Reads schema information from the queried database
pub trait SchemaSource: Send + Sync {
    /// Who and where this source is connected
    fn connection_info(&self) -> &ConnectionInfo;

    /// Definition statements of every accessible table
    fn load_schema(&self) -> Result<LoadedSchema>;

    /// Names of the accessible tables
    fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.load_schema()?.table_names)
    }

    /// Column metadata for `table`
    fn describe_table(&self, table: &str) -> Result<Vec<TableColumn>>;
}

/// Runs validated statements against the queried database
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql`; database failures are returned as `Err`
    fn execute(&self, sql: &str) -> Result<QueryOutcome>;
}

/// True for a plain table identifier
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
