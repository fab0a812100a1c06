//! Interactive question loop and result rendering

use crate::api::pipeline::{Answer, Orchestrator, Session};
use crate::db::{QueryExecutor, QueryOutcome, SchemaSource, TableColumn};
use crate::error::Result;
use std::io::{self, BufRead, Write};

/// Longest cell rendered before truncation
const MAX_CELL_WIDTH: usize = 40;

/// Render a query outcome as a plain text table
pub fn format_outcome(outcome: &QueryOutcome) -> String {
    let (columns, rows) = match outcome {
        QueryOutcome::NoRecords => return "No records found.".to_string(),
        QueryOutcome::Rows { columns, rows } => (columns, rows),
    };

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let render_row = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{:<width$}", value, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out = render_row(columns.as_slice());
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    for row in &cells {
        out.push('\n');
        out.push_str(&render_row(row.as_slice()));
    }
    out.push_str(&format!("\n({} rows)", outcome.row_count()));
    out
}

fn render_cell(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

/// Render column metadata the way `describe` prints it
pub fn format_columns(columns: &[TableColumn]) -> String {
    let mut out = format!("{:<24} {:<16} {:<8} {:<6} {}", "Column", "Type", "Null", "Key", "Default");
    for column in columns {
        out.push_str(&format!(
            "\n{:<24} {:<16} {:<8} {:<6} {}",
            column.column,
            column.data_type,
            if column.nullable { "YES" } else { "NO" },
            column.key,
            column.default
        ));
    }
    out
}

/// Print an answer: SQL, timings, then rows or the error
pub fn print_answer(answer: &Answer) {
    if !answer.sql.is_empty() {
        println!("\n📝 SQL: {}", answer.sql);
    }

    println!(
        "⏱️  retrieval {:.2}s | generation {:.2}s | execution {:.2}s",
        answer.timings.retrieval, answer.timings.generation, answer.timings.execution
    );

    if let Some(report) = &answer.rebuild {
        println!("🔄 Re-indexed {} tables", report.chunks_indexed);
    }

    match (&answer.error, &answer.outcome) {
        (Some(error), _) => println!("❌ {}", error),
        (None, Some(outcome)) => println!("\n{}", format_outcome(outcome)),
        (None, None) => {}
    }
}

/// Interactive session over an opened database.
///
/// Reads questions from stdin until `exit`/`quit` or end of input. Besides
/// questions it understands `help`, `tables`, `describe <table>` and `context <question>`.
pub async fn chat_with_database<D>(orchestrator: &Orchestrator, session: &Session, database: &D) -> Result<()>
where
    D: SchemaSource + QueryExecutor,
{
    println!("💬 Interactive Query Mode");
    println!("   Database: {}", database.connection_info().database);
    println!("   Tables indexed: {}", session.index_report.chunks_indexed);
    if let Some(failure) = &session.index_report.failure {
        println!("⚠️  Indexing failed: {}", failure);
    }
    println!("\nType 'help' for commands, 'exit' to quit");
    println!("{}", "-".repeat(50));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\nQuestion: ");
        io::stdout().flush()?;

        let input = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let lowered = input.to_lowercase();
        match lowered.as_str() {
            "quit" | "exit" | "q" => break,
            "help" => {
                println!("\nCommands:");
                println!("  tables             - List tables");
                println!("  describe <table>   - Show the columns of a table");
                println!("  context <question> - Show the schema context retrieved for a question");
                println!("  help               - Show this help");
                println!("  exit/quit          - End session");
                println!("Anything else is answered as a question.");
            }
            "tables" => match database.table_names() {
                Ok(tables) if tables.is_empty() => println!("No tables found."),
                Ok(tables) => {
                    for table in tables {
                        println!("  {}", table);
                    }
                }
                Err(e) => println!("❌ Error listing tables: {}", e),
            },
            _ if lowered.starts_with("describe ") => {
                let table = input.get("describe ".len()..).unwrap_or_default().trim();
                match database.describe_table(table) {
                    Ok(columns) => println!("\n{}", format_columns(&columns)),
                    Err(e) => println!("❌ Error describing {}: {}", table, e),
                }
            }
            _ if lowered.starts_with("context ") => {
                let question = input.get("context ".len()..).unwrap_or_default().trim();
                let context = orchestrator.retriever().retrieve(question, &session.identity).await;
                println!("\n{}", context.text());
            }
            _ => {
                let answer = orchestrator
                    .answer(input, &session.identity, Some(&session.schema_text), database)
                    .await;
                print_answer(&answer);
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
