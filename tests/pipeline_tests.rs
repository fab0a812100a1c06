//! Orchestrator behavior with deterministic providers
//!
//! Covers the rebuild-once path, both safety gates, terminal failures and the
//! "no relevant tables" fallback.

mod common;

use common::{KeywordEmbedder, RecordingExecutor, SHOP_SCHEMA, ScriptedCompletion};
use querymind_rs::api::pipeline::{EXECUTION_FAILURE_MESSAGE, GENERATION_FAILURE_MESSAGE, INDEX_UNAVAILABLE_MESSAGE};
use querymind_rs::api::{NO_RELEVANT_TABLES, SchemaContext};
use querymind_rs::db::QueryOutcome;
use querymind_rs::safety::{SELECT_ONLY, UNSAFE_OPERATION};
use querymind_rs::{
    ContextRetriever, EmbeddingIndex, FailureKind, IndexIdentity, Orchestrator, SqlGenerator, Stage,
};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    orchestrator: Orchestrator,
    embedder: Arc<KeywordEmbedder>,
    completion: Arc<ScriptedCompletion>,
    identity: IndexIdentity,
    _dir: tempfile::TempDir,
}

fn harness_with(embedder: KeywordEmbedder, completion: ScriptedCompletion, top_k: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(embedder);
    let completion = Arc::new(completion);

    let retriever = ContextRetriever::new(EmbeddingIndex::new(dir.path()), embedder.clone()).with_top_k(top_k);
    let orchestrator = Orchestrator::new(retriever, SqlGenerator::new(completion.clone()));

    Harness {
        orchestrator,
        embedder,
        completion,
        identity: IndexIdentity::derive("alice", "localhost", "shop"),
        _dir: dir,
    }
}

fn harness(reply: &str) -> Harness {
    harness_with(KeywordEmbedder::new(), ScriptedCompletion::replying(reply), 5)
}

fn one_row() -> QueryOutcome {
    QueryOutcome::Rows {
        columns: vec!["n".to_string()],
        rows: vec![vec![json!(2)]],
    }
}

#[tokio::test]
async fn test_missing_index_rebuilds_once() {
    let h = harness("SELECT * FROM customers;");
    let executor = RecordingExecutor::returning(one_row());

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert!(answer.is_success(), "unexpected error: {:?}", answer.error);
    assert_eq!(
        answer.stages,
        vec![
            Stage::Retrieve,
            Stage::RetryIndex,
            Stage::Retrieve,
            Stage::Generate,
            Stage::Extract,
            Stage::Execute,
            Stage::Done
        ]
    );

    let rebuild = answer.rebuild.as_ref().unwrap();
    assert_eq!(rebuild.tables, vec!["customers", "orders", "products"]);
    assert!(answer.context.starts_with("-- Table: customers"));
    assert_eq!(answer.sql, "SELECT * FROM customers;");
    assert_eq!(executor.executed(), vec!["SELECT * FROM customers;"]);
    assert_eq!(h.completion.calls(), 1);
}

#[tokio::test]
async fn test_existing_index_is_not_rebuilt() {
    let h = harness("SELECT * FROM customers;");
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert!(answer.is_success());
    assert!(answer.rebuild.is_none());
    assert!(!answer.stages.contains(&Stage::RetryIndex));
}

#[tokio::test]
async fn test_index_from_other_embedding_model_is_rebuilt() {
    let h = harness("SELECT * FROM customers;");
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let embedder = Arc::new(KeywordEmbedder::named("keyword-bag-v2"));
    let retriever = ContextRetriever::new(h.orchestrator.index().clone(), embedder);
    let orchestrator = Orchestrator::new(retriever, SqlGenerator::new(h.completion.clone()));
    let executor = RecordingExecutor::returning(one_row());

    let answer = orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert!(answer.is_success(), "unexpected error: {:?}", answer.error);
    assert!(answer.stages.contains(&Stage::RetryIndex));
    assert_eq!(
        orchestrator.index().stats(&h.identity).unwrap().unwrap().embedding_model,
        "keyword-bag-v2"
    );
}

#[tokio::test]
async fn test_missing_index_without_schema_is_terminal() {
    let h = harness("SELECT 1;");
    let executor = RecordingExecutor::returning(one_row());

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, None, &executor)
        .await;

    assert_eq!(answer.stages, vec![Stage::Retrieve, Stage::Error]);
    assert_eq!(answer.error.as_deref(), Some(INDEX_UNAVAILABLE_MESSAGE));
    assert_eq!(answer.failure.unwrap().kind, FailureKind::IndexUnavailable);
    assert_eq!(h.completion.calls(), 0);
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_failed_rebuild_is_attempted_only_once() {
    let h = harness_with(KeywordEmbedder::failing_batches(), ScriptedCompletion::replying("SELECT 1;"), 5);
    let executor = RecordingExecutor::returning(one_row());

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(
        answer.stages,
        vec![Stage::Retrieve, Stage::RetryIndex, Stage::Retrieve, Stage::Error]
    );
    assert!(answer.rebuild.as_ref().unwrap().failure.is_some());
    assert_eq!(answer.failure.unwrap().kind, FailureKind::IndexUnavailable);
    assert_eq!(h.embedder.calls(), 3);
    assert_eq!(h.completion.calls(), 0);
}

#[tokio::test]
async fn test_retrieval_error_is_terminal_without_rebuild() {
    let h = harness_with(KeywordEmbedder::failing(), ScriptedCompletion::replying("SELECT 1;"), 5);
    let executor = RecordingExecutor::returning(one_row());

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(answer.stages, vec![Stage::Retrieve, Stage::Error]);
    assert_eq!(answer.failure.as_ref().unwrap().kind, FailureKind::RetrievalFailure);
    assert!(answer.rebuild.is_none());
    assert!(!answer.error.unwrap().contains("unreachable"));
    assert_eq!(h.embedder.calls(), 1);
    assert_eq!(h.completion.calls(), 0);
}

#[tokio::test]
async fn test_dangerous_question_never_reaches_model() {
    let h = harness("SELECT 1;");
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("DROP all tables", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(answer.error.as_deref(), Some(SELECT_ONLY));
    assert_eq!(answer.failure.unwrap().kind, FailureKind::UnsafeRequest);
    assert_eq!(h.completion.calls(), 0);
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_unsafe_generated_sql_is_rejected() {
    let h = harness("DELETE FROM customers;");
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("Which customers signed up last week?", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(answer.error.as_deref(), Some(UNSAFE_OPERATION));
    assert_eq!(answer.failure.as_ref().unwrap().stage, Stage::Extract);
    assert!(answer.sql.is_empty());
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_stacked_statement_executes_first_select_only() {
    let h = harness("```sql\nSELECT name FROM customers; DROP TABLE customers;\n```");
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("customer names", &h.identity, None, &executor)
        .await;

    assert!(answer.is_success());
    assert_eq!(executor.executed(), vec!["SELECT name FROM customers;"]);
}

#[tokio::test]
async fn test_refusal_is_generation_failure() {
    let h = harness("I'm sorry, I cannot answer that from this schema.");
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("What is the weather?", &h.identity, None, &executor)
        .await;

    assert_eq!(answer.failure.as_ref().unwrap().kind, FailureKind::GenerationFailure);
    assert!(answer.error.unwrap().starts_with("Error:"));
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_provider_failure_message_does_not_leak() {
    let h = harness_with(KeywordEmbedder::new(), ScriptedCompletion::failing("401 bad key sk-test"), 5);
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, None, &executor)
        .await;

    assert_eq!(answer.error.as_deref(), Some(GENERATION_FAILURE_MESSAGE));
    assert_eq!(answer.failure.unwrap().stage, Stage::Generate);
}

#[tokio::test]
async fn test_execution_failure_is_terminal() {
    let h = harness("SELECT nope FROM customers;");
    let executor = RecordingExecutor::failing("no such column: nope");
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("List all customers", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(answer.error.as_deref(), Some(EXECUTION_FAILURE_MESSAGE));
    assert_eq!(answer.failure.unwrap().kind, FailureKind::ExecutionFailure);
    assert_eq!(answer.sql, "SELECT nope FROM customers;");
    assert_eq!(executor.executed().len(), 1);
    assert_eq!(h.completion.calls(), 1);
}

#[tokio::test]
async fn test_no_relevant_tables_still_generates() {
    let h = harness_with(KeywordEmbedder::new(), ScriptedCompletion::replying("SELECT 1;"), 0);
    let executor = RecordingExecutor::returning(one_row());
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let answer = h
        .orchestrator
        .answer("how many planets are there", &h.identity, Some(SHOP_SCHEMA), &executor)
        .await;

    assert_eq!(answer.context, NO_RELEVANT_TABLES);
    assert!(answer.is_success());
    assert_eq!(h.completion.calls(), 1);
    assert!(h.completion.last_prompt().unwrap().contains(NO_RELEVANT_TABLES));
}

#[tokio::test]
async fn test_rebuild_replaces_previous_tables() {
    let h = harness("SELECT 1;");
    let first = "CREATE TABLE a (id int);\nCREATE TABLE b (id int);\nCREATE TABLE c (id int);";
    let second = "CREATE TABLE d (id int);\nCREATE TABLE e (id int);";

    let report = h.orchestrator.rebuild_index(&h.identity, first).await.unwrap();
    assert_eq!(report.tables, vec!["a", "b", "c"]);

    let report = h.orchestrator.rebuild_index(&h.identity, second).await.unwrap();
    assert!(report.is_success());

    let context = h.orchestrator.retriever().retrieve("anything", &h.identity).await;
    let mut names = context.table_names();
    names.sort();
    assert_eq!(names, vec!["d", "e"]);
}

#[tokio::test]
async fn test_ranking_prefers_matching_table() {
    let h = harness_with(KeywordEmbedder::new(), ScriptedCompletion::replying("SELECT 1;"), 1);
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let context = h
        .orchestrator
        .retriever()
        .retrieve("what is the price of each product", &h.identity)
        .await;

    match context {
        SchemaContext::Found(hits) => {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].table_name, "products");
        }
        other => panic!("expected hits, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identities_are_isolated() {
    let h = harness("SELECT 1;");
    h.orchestrator.rebuild_index(&h.identity, SHOP_SCHEMA).await.unwrap();

    let other = IndexIdentity::derive("bob", "localhost", "shop");
    let context = h.orchestrator.retriever().retrieve("customers", &other).await;
    assert_eq!(context, SchemaContext::IndexUnavailable);

    assert!(h.orchestrator.index().invalidate(&h.identity).unwrap());
    let context = h.orchestrator.retriever().retrieve("customers", &h.identity).await;
    assert!(context.needs_rebuild());
}
