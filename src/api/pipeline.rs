//! Orchestrator - the per-request pipeline
//!
//! A request runs through an explicit state machine:
//!
//! ```text
//! Retrieve -> (RetryIndex -> Retrieve)? -> Generate -> Extract -> Execute -> Done
//!     \______________\_________________________\__________\__________\-> Error
//! ```
//!
//! The only automatic retry is a single index rebuild after retrieval reports an
//! unavailable index. Execution is never retried.

use crate::api::generator::{OpenAiCompletion, SqlGenerator};
use crate::api::retriever::{ContextRetriever, SchemaContext};
use crate::config::Config;
use crate::db::{QueryExecutor, QueryOutcome, SchemaSource};
use crate::error::Result;
use crate::ml::{EmbeddingIndex, IndexBuildReport, IndexIdentity, OllamaEmbedder};
use crate::safety::{Extraction, LLM_ERROR_PREFIX, SELECT_ONLY, UNSAFE_OPERATION, is_error_text};
use crate::text::SchemaChunker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// User-facing message when the index cannot be rebuilt
pub const INDEX_UNAVAILABLE_MESSAGE: &str =
    "Error: Schema not indexed. Please log out and log in again to re-index the database schema.";

/// User-facing message for retrieval faults
pub const RETRIEVAL_FAILURE_MESSAGE: &str = "Error: Could not retrieve schema context. Please try again.";

/// User-facing message for completion provider faults
pub const GENERATION_FAILURE_MESSAGE: &str = "Error: The language model could not generate a query. Please try again.";

/// User-facing message for failed SELECTs
pub const EXECUTION_FAILURE_MESSAGE: &str =
    "Error: The generated query failed to run against the database. Try rephrasing your question.";

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Retrieve,
    RetryIndex,
    Generate,
    Extract,
    Execute,
    Done,
    Error,
}

/// Category of a terminal request failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Index missing or empty, rebuild did not help
    IndexUnavailable,
    /// Retrieval failed for another reason
    RetrievalFailure,
    /// A safety gate rejected the question or the generated statement
    UnsafeRequest,
    /// The completion provider failed or produced no usable SQL
    GenerationFailure,
    /// The validated SELECT failed at the database
    ExecutionFailure,
}

/// A terminal failure with its user-facing message.
///
/// `message` never carries raw database or provider errors; those go to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
}

/// Elapsed seconds per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Retrieval, including any rebuild
    pub retrieval: f64,
    pub generation: f64,
    pub execution: f64,
}

/// Result of answering one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    /// Validated statement; empty unless extraction succeeded
    pub sql: String,
    /// Retrieved context in text form
    pub context: String,
    pub timings: StageTimings,
    /// User-facing error, `None` on success
    pub error: Option<String>,
    pub failure: Option<PipelineFailure>,
    pub outcome: Option<QueryOutcome>,
    /// States visited, in order
    pub stages: Vec<Stage>,
    /// Report of the in-request rebuild, if one ran
    pub rebuild: Option<IndexBuildReport>,
}

impl Answer {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            sql: String::new(),
            context: String::new(),
            timings: StageTimings::default(),
            error: None,
            failure: None,
            outcome: None,
            stages: Vec::new(),
            rebuild: None,
        }
    }

    /// True when the statement ran successfully
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcome.is_some()
    }

    fn fail(&mut self, kind: FailureKind, stage: Stage, message: impl Into<String>) -> Stage {
        let message = message.into();
        self.error = Some(message.clone());
        self.failure = Some(PipelineFailure { kind, stage, message });
        Stage::Error
    }
}

/// A database whose schema has been loaded and indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub identity: IndexIdentity,
    pub schema_text: String,
    pub table_names: Vec<String>,
    pub index_report: IndexBuildReport,
}

/// Sequences retrieval, generation, extraction and execution per request
#[derive(Clone)]
pub struct Orchestrator {
    retriever: ContextRetriever,
    generator: SqlGenerator,
}

impl Orchestrator {
    pub fn new(retriever: ContextRetriever, generator: SqlGenerator) -> Self {
        Self { retriever, generator }
    }

    /// Wire up the Ollama embedder and the OpenAI-compatible completion client
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let embedder = Arc::new(OllamaEmbedder::new(&config.models)?);
        let completion = Arc::new(OpenAiCompletion::new(&config.models)?);
        let index = EmbeddingIndex::new(&config.storage.index_root);

        let retriever = ContextRetriever::new(index, embedder).with_top_k(config.retrieval.top_k);
        Ok(Self::new(retriever, SqlGenerator::new(completion)))
    }

    /// The index requests are answered from
    pub fn index(&self) -> &EmbeddingIndex {
        self.retriever.index()
    }

    /// The context retriever
    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    /// Chunk `schema_text` and rebuild `identity`'s index from it
    pub async fn rebuild_index(&self, identity: &IndexIdentity, schema_text: &str) -> Result<IndexBuildReport> {
        let chunks = SchemaChunker::new()?.chunk(schema_text);
        let embedder = self.retriever.embedder();
        Ok(self.retriever.index().build(identity, &chunks, embedder.as_ref()).await)
    }

    /// Load the schema from `source` and index it under the source's identity
    pub async fn open_session(&self, source: &dyn SchemaSource) -> Result<Session> {
        let identity = source.connection_info().identity();
        let schema = source.load_schema()?;

        let index_report = if schema.schema_text.is_empty() {
            log::warn!("Schema for {} is empty, nothing to index", identity);
            IndexBuildReport {
                failure: Some("schema is empty".to_string()),
                ..Default::default()
            }
        } else {
            self.rebuild_index(&identity, &schema.schema_text).await?
        };

        Ok(Session {
            identity,
            schema_text: schema.schema_text,
            table_names: schema.table_names,
            index_report,
        })
    }

    /// Drop the index of a closed session
    pub fn close_session(&self, session: &Session) -> Result<bool> {
        self.index().invalidate(&session.identity)
    }

    /// Answer `question` for `identity`, executing the validated SELECT on `executor`.
    ///
    /// `schema_text` enables the one-time rebuild when the index is unavailable.
    /// Expected failures are reported in the returned [`Answer`].
    pub async fn answer(
        &self,
        question: &str,
        identity: &IndexIdentity,
        schema_text: Option<&str>,
        executor: &dyn QueryExecutor,
    ) -> Answer {
        let mut answer = Answer::new(question);
        let mut context = SchemaContext::NoRelevantTables;
        let mut raw_sql = String::new();
        let mut rebuilt = false;
        let mut retrieval_started = Instant::now();
        let mut stage = Stage::Retrieve;

        loop {
            answer.stages.push(stage);
            stage = match stage {
                Stage::Retrieve => {
                    if !rebuilt {
                        retrieval_started = Instant::now();
                    }
                    context = self.retriever.retrieve(question, identity).await;
                    answer.context = context.text();
                    answer.timings.retrieval = retrieval_started.elapsed().as_secs_f64();

                    match &context {
                        SchemaContext::IndexUnavailable => match schema_text {
                            Some(text) if !rebuilt && !text.is_empty() => Stage::RetryIndex,
                            _ => answer.fail(FailureKind::IndexUnavailable, Stage::Retrieve, INDEX_UNAVAILABLE_MESSAGE),
                        },
                        SchemaContext::Failed(reason) => {
                            log::error!("Retrieval failed for {}: {}", identity, reason);
                            answer.fail(FailureKind::RetrievalFailure, Stage::Retrieve, RETRIEVAL_FAILURE_MESSAGE)
                        }
                        SchemaContext::Found(_) | SchemaContext::NoRelevantTables => Stage::Generate,
                    }
                }
                Stage::RetryIndex => {
                    rebuilt = true;
                    log::info!("Schema not indexed for {}, re-indexing now", identity);
                    match self.rebuild_index(identity, schema_text.unwrap_or_default()).await {
                        Ok(report) => {
                            if let Some(failure) = &report.failure {
                                log::warn!("Re-indexing failed: {}", failure);
                            }
                            answer.rebuild = Some(report);
                        }
                        Err(e) => log::warn!("Re-indexing failed: {}", e),
                    }
                    Stage::Retrieve
                }
                Stage::Generate => {
                    let started = Instant::now();
                    raw_sql = self.generator.generate(question, &context.text()).await;
                    answer.timings.generation = started.elapsed().as_secs_f64();

                    if is_error_text(&raw_sql) {
                        Self::fail_generation(&mut answer, &raw_sql)
                    } else {
                        Stage::Extract
                    }
                }
                Stage::Extract => match Extraction::from_output(&raw_sql) {
                    Extraction::Sql(sql) => {
                        answer.sql = sql;
                        Stage::Execute
                    }
                    Extraction::Rejected(reason) => {
                        log::warn!("Generated output rejected: {}", reason);
                        let kind = if reason == SELECT_ONLY || reason == UNSAFE_OPERATION {
                            FailureKind::UnsafeRequest
                        } else {
                            FailureKind::GenerationFailure
                        };
                        answer.fail(kind, Stage::Extract, reason)
                    }
                },
                Stage::Execute => {
                    let started = Instant::now();
                    let result = executor.execute(&answer.sql);
                    answer.timings.execution = started.elapsed().as_secs_f64();

                    match result {
                        Ok(outcome) => {
                            answer.outcome = Some(outcome);
                            Stage::Done
                        }
                        Err(e) => {
                            log::error!("Query execution failed for {:?}: {}", answer.sql, e);
                            answer.fail(FailureKind::ExecutionFailure, Stage::Execute, EXECUTION_FAILURE_MESSAGE)
                        }
                    }
                }
                Stage::Done | Stage::Error => break,
            };
        }

        log::info!(
            "Answered in {:.3}s retrieval, {:.3}s generation, {:.3}s execution ({})",
            answer.timings.retrieval,
            answer.timings.generation,
            answer.timings.execution,
            if answer.error.is_some() { "error" } else { "ok" }
        );
        answer
    }

    fn fail_generation(answer: &mut Answer, output: &str) -> Stage {
        if output == SELECT_ONLY {
            log::warn!("Question rejected before generation");
            answer.fail(FailureKind::UnsafeRequest, Stage::Generate, SELECT_ONLY)
        } else if output.starts_with(LLM_ERROR_PREFIX) {
            log::error!("{}", output);
            answer.fail(FailureKind::GenerationFailure, Stage::Generate, GENERATION_FAILURE_MESSAGE)
        } else {
            answer.fail(FailureKind::GenerationFailure, Stage::Generate, output)
        }
    }
}
