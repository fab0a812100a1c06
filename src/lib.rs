//! # querymind-rs
//!
//! Natural-language questions to safe, read-only SQL. The database's own schema
//! is chunked per table, embedded and indexed; each question retrieves the most
//! relevant tables, a language model writes one SELECT from that context, and two
//! independent safety gates keep anything but a single SELECT from reaching the
//! database.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use querymind_rs::{Config, Orchestrator, SqliteDatabase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::from_config(&Config::default())?;
//!
//!     // Load and index the schema
//!     let database = SqliteDatabase::open("shop.db", "analyst")?;
//!     let session = orchestrator.open_session(&database).await?;
//!
//!     let answer = orchestrator
//!         .answer("How many customers live in Oslo?", &session.identity, Some(&session.schema_text), &database)
//!         .await;
//!
//!     match answer.error {
//!         Some(error) => println!("{}", error),
//!         None => println!("{}\n{:?}", answer.sql, answer.outcome),
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod eval;
pub mod ml;
pub mod safety;
pub mod storage;
pub mod text;

// Re-export main API types
pub use api::{
    Answer, CompletionProvider, ContextRetriever, FailureKind, OpenAiCompletion, Orchestrator, SchemaContext,
    Session, SqlGenerator, Stage, StageTimings, chat_with_database,
};
pub use config::Config;
pub use db::{ConnectionInfo, QueryExecutor, QueryOutcome, SchemaSource, SqliteDatabase};
pub use error::{QueryMindError, Result};

// Re-export commonly used types
pub use ml::{EmbeddingIndex, EmbeddingProvider, IndexBuildReport, IndexIdentity, OllamaEmbedder};
pub use safety::{extract_sql, is_dangerous};
pub use text::{SchemaChunk, SchemaChunker};
