//! Evaluation against gold questions
//!
//! Each gold case pairs a question with a hand-written SQL statement. A run asks
//! the pipeline every question, executes both statements and records whether
//! their results match. Result files are JSON arrays of [`EvaluationRecord`] and
//! can be aggregated later with [`summarize_files`].

use crate::api::Orchestrator;
use crate::db::QueryExecutor;
use crate::error::{QueryMindError, Result};
use crate::ml::IndexIdentity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A question with its reference SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldCase {
    pub id: serde_json::Value,
    pub question: String,
    pub gold_sql: String,
}

/// Outcome of one gold case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: serde_json::Value,
    pub question: String,
    pub completion_model: String,
    pub embedding_model: String,
    pub gold_sql: String,
    /// Validated SQL, or the error the pipeline answered with
    pub generated_sql: String,
    pub time_context_seconds: f64,
    pub time_generate_sql_seconds: f64,
    /// Both statements ran and returned identical results
    pub result_match: bool,
}

/// Aggregate over one result file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub file: String,
    pub total: usize,
    pub result_match_rate: f64,
    pub avg_time_context: f64,
    pub avg_time_generate: f64,
}

/// Model names recorded alongside each result
#[derive(Debug, Clone, Default)]
pub struct RunLabels {
    pub completion_model: String,
    pub embedding_model: String,
}

/// Load gold cases from a JSON array
pub fn load_gold_cases<P: AsRef<Path>>(path: P) -> Result<Vec<GoldCase>> {
    let data = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&data)?)
}

/// Load the records of a previous run
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<EvaluationRecord>> {
    let data = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&data)?)
}

/// Write run records as pretty-printed JSON
pub fn save_records<P: AsRef<Path>>(path: P, records: &[EvaluationRecord]) -> Result<()> {
    std::fs::write(path.as_ref(), serde_json::to_string_pretty(records)?)?;
    log::info!("Results saved to {}", path.as_ref().display());
    Ok(())
}

/// Conventional result file name for a model pair
pub fn results_file_name(labels: &RunLabels) -> String {
    format!(
        "results_{}_{}.json",
        labels.completion_model.replace(':', "_"),
        labels.embedding_model.replace(':', "_")
    )
}

/// Ask every gold question and compare results with the gold SQL
pub async fn run_evaluation(
    orchestrator: &Orchestrator,
    identity: &IndexIdentity,
    schema_text: Option<&str>,
    executor: &dyn QueryExecutor,
    cases: &[GoldCase],
    labels: &RunLabels,
) -> Vec<EvaluationRecord> {
    let mut records = Vec::with_capacity(cases.len());

    for case in cases {
        log::info!("Question {}: {}", case.id, case.question);
        let answer = orchestrator.answer(&case.question, identity, schema_text, executor).await;

        let gold = match executor.execute(&case.gold_sql) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("Gold SQL for case {} failed: {}", case.id, e);
                None
            }
        };

        let result_match = matches!((&gold, &answer.outcome), (Some(g), Some(a)) if g == a);
        let generated_sql = match &answer.error {
            Some(error) if answer.sql.is_empty() => error.clone(),
            _ => answer.sql.clone(),
        };

        log::info!("Result match: {}", result_match);
        records.push(EvaluationRecord {
            id: case.id.clone(),
            question: case.question.clone(),
            completion_model: labels.completion_model.clone(),
            embedding_model: labels.embedding_model.clone(),
            gold_sql: case.gold_sql.clone(),
            generated_sql,
            time_context_seconds: round_millis(answer.timings.retrieval),
            time_generate_sql_seconds: round_millis(answer.timings.generation),
            result_match,
        });
    }

    records
}

/// Aggregate the records of one run
pub fn summarize(file: &str, records: &[EvaluationRecord]) -> EvaluationSummary {
    let total = records.len();
    if total == 0 {
        return EvaluationSummary {
            file: file.to_string(),
            total: 0,
            result_match_rate: 0.0,
            avg_time_context: 0.0,
            avg_time_generate: 0.0,
        };
    }

    let matches = records.iter().filter(|r| r.result_match).count();
    let n = total as f64;

    EvaluationSummary {
        file: file.to_string(),
        total,
        result_match_rate: matches as f64 / n,
        avg_time_context: records.iter().map(|r| r.time_context_seconds).sum::<f64>() / n,
        avg_time_generate: records.iter().map(|r| r.time_generate_sql_seconds).sum::<f64>() / n,
    }
}

/// Summarize result files, best match rate first and faster generation breaking ties.
///
/// Unreadable files are logged and skipped.
pub fn summarize_files<P: AsRef<Path>>(paths: &[P]) -> Vec<EvaluationSummary> {
    let mut summaries: Vec<EvaluationSummary> = paths
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            match load_records(path) {
                Ok(records) => Some(summarize(&path.display().to_string(), &records)),
                Err(e) => {
                    log::warn!("Failed to analyze {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.result_match_rate
            .total_cmp(&a.result_match_rate)
            .then(a.avg_time_generate.total_cmp(&b.avg_time_generate))
    });
    summaries
}

/// Find `results_*.json` files directly inside `dir`
pub fn find_result_files<P: AsRef<Path>>(dir: P) -> Result<Vec<std::path::PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(QueryMindError::Config(format!("Not a directory: {}", dir.display())));
    }

    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("results_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
