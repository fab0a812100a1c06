//! Post-generation SQL extraction and validation
//!
//! Model output is narrowed down to a single SELECT statement and then checked
//! again for mutating keywords. This is the enforcement boundary: the model can
//! produce unsafe SQL whatever the question said.
//!
//! Validation is keyword denial, not parsing. Comments splitting a keyword or
//! encoded literals are not detected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Prefix of every rejection produced by the safety gates
pub const ERROR_PREFIX: &str = "Error:";

/// Prefix of completion provider failures
pub const LLM_ERROR_PREFIX: &str = "LLM Error:";

/// Rejection for anything that is not a SELECT
pub const SELECT_ONLY: &str = "Error: Only SELECT queries are allowed.";

/// Rejection for a candidate carrying a mutating keyword
pub const UNSAFE_OPERATION: &str = "Error: Only SELECT queries are allowed. Detected unsafe operation.";

const REFUSAL_PHRASES: &[&str] = &["sorry", "i cannot", "i can't", "i'm sorry"];

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:think|thinking|reasoning)>.*?</(?:think|thinking|reasoning)>")
        .expect("reasoning block pattern is valid")
});
static SQL_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```sql\s*").expect("sql fence pattern is valid"));
static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\s*").expect("fence pattern is valid"));
static TERMINATED_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(SELECT\s+.+?;)").expect("select pattern is valid"));
static OPEN_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(SELECT\s+.+?)(?:\n\n|$)").expect("open select pattern is valid"));
static LINE_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT").expect("line select pattern is valid"));
static UNSAFE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|GRANT|REVOKE)\b")
        .expect("unsafe keyword pattern is valid")
});
static LEADING_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SELECT").expect("leading select pattern is valid"));

/// True for text carrying one of the in-band error prefixes
pub fn is_error_text(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX) || text.starts_with(LLM_ERROR_PREFIX)
}

/// Result of running model output through the extraction gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extraction {
    /// A single validated SELECT statement
    Sql(String),
    /// Rejection or upstream error text, always prefixed
    Rejected(String),
}

impl Extraction {
    /// Extract and validate a SELECT statement from raw model output
    pub fn from_output(model_output: &str) -> Self {
        if is_error_text(model_output) {
            return Extraction::Rejected(model_output.to_string());
        }

        let lowered = model_output.trim().to_lowercase();
        if REFUSAL_PHRASES.iter().any(|phrase| lowered.starts_with(phrase)) {
            log::warn!("Model refused to produce SQL");
            return Extraction::Rejected(format!("{} {}", ERROR_PREFIX, model_output.trim()));
        }

        let cleaned = REASONING_BLOCK.replace_all(model_output, "");
        let cleaned = SQL_FENCE.replace_all(&cleaned, "");
        let cleaned = FENCE.replace_all(&cleaned, "");

        let mut candidate = locate_select(&cleaned).trim().to_string();
        if let Some(end) = candidate.find(';') {
            candidate.truncate(end + 1);
        }

        if UNSAFE_KEYWORD.is_match(&candidate) {
            log::warn!("Rejected generated SQL with unsafe keyword: {}", candidate);
            return Extraction::Rejected(UNSAFE_OPERATION.to_string());
        }

        if !LEADING_SELECT.is_match(&candidate) {
            log::warn!("Rejected generated text that is not a SELECT");
            return Extraction::Rejected(SELECT_ONLY.to_string());
        }

        Extraction::Sql(candidate)
    }

    /// Flatten into the in-band string form
    pub fn into_string(self) -> String {
        match self {
            Extraction::Sql(text) | Extraction::Rejected(text) => text,
        }
    }
}

/// Extract a validated statement, or a value beginning with `"Error:"` / `"LLM Error:"`
pub fn extract_sql(model_output: &str) -> String {
    Extraction::from_output(model_output).into_string()
}

fn locate_select(text: &str) -> String {
    if let Some(m) = TERMINATED_SELECT.captures(text).and_then(|caps| caps.get(1)) {
        return m.as_str().to_string();
    }
    if let Some(m) = OPEN_SELECT.captures(text).and_then(|caps| caps.get(1)) {
        return m.as_str().to_string();
    }

    let mut lines = Vec::new();
    let mut in_statement = false;
    for line in text.lines() {
        let line = line.trim();
        if LINE_SELECT.is_match(line) {
            in_statement = true;
        }
        if in_statement {
            lines.push(line);
            if line.ends_with(';') {
                break;
            }
        }
    }

    if lines.is_empty() {
        text.trim().to_string()
    } else {
        lines.join("\n")
    }
}
