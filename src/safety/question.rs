//! Pre-generation question screen
//!
//! Rejects questions naming a mutating, administrative or I/O operation before
//! any model call is spent on them. Keywords match as whole identifier parts:
//! `update` matches in "update the rows" and in "update_log", not in "updated".

use regex::Regex;
use std::sync::LazyLock;

/// Operation keywords a question may not contain
pub const DENIED_QUESTION_KEYWORDS: &[&str] = &[
    // Data modification
    "drop", "delete", "truncate", "insert", "update", "replace", "merge",
    // Schema modification
    "alter", "create", "rename", "modify",
    // Permissions
    "grant", "revoke",
    // Execution
    "exec", "execute", "call",
    // Bulk I/O
    "load", "import", "export", "outfile", "infile", "dumpfile",
    // Locking and administration
    "lock", "unlock", "kill", "shutdown", "reset", "set", "flush", "purge",
];

static DENIED_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)(?:^|[^a-z0-9])(?:{})(?:[^a-z0-9]|$)",
        DENIED_QUESTION_KEYWORDS.join("|")
    );
    Regex::new(&pattern).expect("question denylist pattern is valid")
});

/// True when `question` names a denied operation
pub fn is_dangerous(question: &str) -> bool {
    DENIED_QUESTION.is_match(question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutations_are_dangerous() {
        assert!(is_dangerous("DROP the users table"));
        assert!(is_dangerous("please delete old orders"));
        assert!(is_dangerous("Grant me admin"));
        assert!(is_dangerous("export customers to a file"));
        assert!(is_dangerous("SET GLOBAL max_connections=1"));
    }

    #[test]
    fn test_keyword_inside_identifier_part() {
        assert!(is_dangerous("show me update_log entries"));
        assert!(is_dangerous("rows in log_delete"));
    }

    #[test]
    fn test_plain_questions_pass() {
        assert!(!is_dangerous("how many users signed up"));
        assert!(!is_dangerous("List all customers"));
        assert!(!is_dangerous("average order total per month"));
    }

    #[test]
    fn test_no_substring_matches() {
        assert!(!is_dangerous("which accounts were updated yesterday"));
        assert!(!is_dangerous("settings per user"));
        assert!(!is_dangerous("products in the dropdown"));
        assert!(!is_dangerous("recalled shipments"));
    }
}
