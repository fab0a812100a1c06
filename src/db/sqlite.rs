//! SQLite database collaborator
//!
//! Every call opens its own connection. Query execution uses a read-only
//! connection, so the database rejects writes even if a statement slipped
//! past the safety gates.

use crate::db::{ConnectionInfo, LoadedSchema, QueryExecutor, QueryOutcome, SchemaSource, TableColumn, is_valid_identifier};
use crate::error::{QueryMindError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// A SQLite database file used as schema source and query executor
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
    info: ConnectionInfo,
}

impl SqliteDatabase {
    /// Connect to an existing SQLite file as `user`
    pub fn open<P: AsRef<Path>>(path: P, user: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QueryMindError::Database(format!("Database file not found: {}", path.display())));
        }

        let canonical = path.canonicalize()?;
        let info = ConnectionInfo::new(user, "localhost", canonical.to_string_lossy());

        let db = Self { path: canonical, info };
        db.connect_read_only()?;
        log::info!("Connected to {} as {}", db.path.display(), user);
        Ok(db)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect_read_only(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| QueryMindError::Database(format!("Failed to connect: {}", e)))
    }
}

impl SchemaSource for SqliteDatabase {
    fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn load_schema(&self) -> Result<LoadedSchema> {
        let conn = self.connect_read_only()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, sql FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
                 ORDER BY name",
            )
            .map_err(|e| QueryMindError::Database(format!("Could not read schema from database: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| QueryMindError::Database(format!("Could not read schema from database: {}", e)))?;

        let mut schema = LoadedSchema::default();
        for row in rows {
            let (name, sql) = row.map_err(|e| QueryMindError::Database(format!("Could not read schema row: {}", e)))?;
            schema.schema_text.push_str(&format!("{};\n\n", sql.trim_end_matches(';')));
            schema.table_names.push(name);
        }

        log::debug!("Loaded schema with {} tables", schema.table_names.len());
        Ok(schema)
    }

    fn describe_table(&self, table: &str) -> Result<Vec<TableColumn>> {
        if !is_valid_identifier(table) {
            return Err(QueryMindError::Database(format!("Invalid table name: {}", table)));
        }

        let conn = self.connect_read_only()?;
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", table))
            .map_err(|e| QueryMindError::Database(format!("Failed to describe {}: {}", table, e)))?;

        let columns = stmt
            .query_map([], |row| {
                let not_null: i64 = row.get(3)?;
                let default: Option<String> = row.get(4)?;
                let pk: i64 = row.get(5)?;
                Ok(TableColumn {
                    column: row.get(1)?,
                    data_type: row.get(2)?,
                    nullable: not_null == 0,
                    key: if pk > 0 { "PRI".to_string() } else { "-".to_string() },
                    default: default.unwrap_or_else(|| "-".to_string()),
                })
            })
            .map_err(|e| QueryMindError::Database(format!("Failed to describe {}: {}", table, e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(QueryMindError::Database(format!("Unknown table: {}", table)));
        }
        Ok(columns)
    }
}

impl QueryExecutor for SqliteDatabase {
    fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        let conn = self.connect_read_only()?;
        let mut stmt = conn.prepare(sql).map_err(|e| QueryMindError::Database(e.to_string()))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(|e| QueryMindError::Database(e.to_string()))?;
        while let Some(row) = cursor.next().map_err(|e| QueryMindError::Database(e.to_string()))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| QueryMindError::Database(e.to_string()))?;
                values.push(to_json(value));
            }
            rows.push(values);
        }

        if rows.is_empty() {
            return Ok(QueryOutcome::NoRecords);
        }
        Ok(QueryOutcome::Rows { columns, rows })
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}
