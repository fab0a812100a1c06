//! SELECT-only safety gates
//!
//! Two independent checkpoints guard the pipeline:
//!
//! - [`is_dangerous`] screens the question before generation.
//! - [`extract_sql`] / [`Extraction`] narrows model output to one validated
//!   SELECT statement after generation.
//!
//! A request must pass both; passing one never skips the other.

pub mod extract;
pub mod question;

pub use extract::{
    ERROR_PREFIX, Extraction, LLM_ERROR_PREFIX, SELECT_ONLY, UNSAFE_OPERATION, extract_sql, is_error_text,
};
pub use question::{DENIED_QUESTION_KEYWORDS, is_dangerous};
