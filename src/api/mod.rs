//! API layer for querymind-rs
//!
//! Retrieval, generation and the orchestrator that sequences them per
//! question, plus the interactive chat front end.

pub mod chat;
pub mod generator;
pub mod pipeline;
pub mod retriever;

pub use chat::{chat_with_database, format_columns, format_outcome, print_answer};
pub use generator::{CompletionProvider, OpenAiCompletion, SqlGenerator, build_prompt, clean_completion};
pub use pipeline::{Answer, FailureKind, Orchestrator, PipelineFailure, Session, Stage, StageTimings};
pub use retriever::{ContextRetriever, NO_RELEVANT_TABLES, SCHEMA_NOT_INDEXED, SchemaContext};
