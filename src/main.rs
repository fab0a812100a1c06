//! querymind-rs CLI application
//!
//! Command-line interface for the querymind-rs library.

use clap::{Args, Parser, Subcommand};
use querymind_rs::api::{format_columns, print_answer};
use querymind_rs::eval::{self, RunLabels};
use querymind_rs::{Config, Orchestrator, SchemaSource, SqliteDatabase, chat_with_database};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "querymind-rs")]
#[command(about = "Ask questions about a database in plain language and get read-only SQL back")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file to query
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// User name the index identity is derived from
    #[arg(short, long, global = true, env = "USER", default_value = "analyst")]
    user: String,

    /// Directory holding the schema indexes
    #[arg(long, global = true)]
    index_root: Option<PathBuf>,

    /// Number of tables retrieved per question
    #[arg(short = 'k', long, global = true)]
    top_k: Option<usize>,

    /// Embedding model
    #[arg(long, global = true)]
    embedding_model: Option<String>,

    /// Completion model used for SQL generation
    #[arg(short, long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the database schema and (re)build its index
    Index,

    /// Answer a single question
    Ask {
        /// The question
        question: String,

        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive question session
    Chat,

    /// List the database tables
    Tables,

    /// Show the columns of a table
    Describe {
        /// Table name
        table: String,
    },

    /// Drop the schema index (the next question rebuilds it)
    Invalidate,

    /// Show schema index statistics
    Stats,

    /// Run the gold questions and record how often results match
    Evaluate {
        /// Gold question file (JSON array of {id, question, gold_sql})
        #[arg(short, long, default_value = "gold_questions.json")]
        gold: PathBuf,

        /// Result file; defaults to results_<model>_<embedding>.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Aggregate evaluation result files
    Summarize {
        /// Directory containing results_*.json files
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Summary report file
        #[arg(short, long, default_value = "summary_report.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Index => index_command(&cli.global, &config).await?,
        Commands::Ask { question, json } => ask_command(&cli.global, &config, &question, json).await?,
        Commands::Chat => chat_command(&cli.global, &config).await?,
        Commands::Tables => tables_command(&cli.global)?,
        Commands::Describe { table } => describe_command(&cli.global, &table)?,
        Commands::Invalidate => invalidate_command(&cli.global, &config)?,
        Commands::Stats => stats_command(&cli.global, &config)?,
        Commands::Evaluate { gold, output } => evaluate_command(&cli.global, &config, gold, output).await?,
        Commands::Summarize { dir, output } => summarize_command(dir, output)?,
    }

    Ok(())
}

fn load_config(args: &GlobalArgs) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();

    if let Some(root) = &args.index_root {
        config.storage.index_root = root.clone();
    }
    if let Some(top_k) = args.top_k {
        config.retrieval.top_k = top_k;
    }
    if let Some(model) = &args.embedding_model {
        config.models.embedding_model = model.clone();
    }
    if let Some(model) = &args.model {
        config.models.completion_model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

fn open_database(args: &GlobalArgs) -> Result<SqliteDatabase, Box<dyn std::error::Error>> {
    let path = args
        .database
        .as_ref()
        .ok_or("No database given; pass --database <file>")?;
    Ok(SqliteDatabase::open(path, &args.user)?)
}

async fn index_command(args: &GlobalArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let orchestrator = Orchestrator::from_config(config)?;

    println!("🔧 Indexing schema of {} ...", database.path().display());
    let session = orchestrator.open_session(&database).await?;
    let report = &session.index_report;

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    match &report.failure {
        Some(failure) => println!("❌ Indexing failed: {}", failure),
        None => {
            println!("✅ Indexed {} tables in {:.2}s", report.chunks_indexed, report.elapsed_secs);
            println!("   Identity: {}", session.identity);
        }
    }
    Ok(())
}

async fn ask_command(
    args: &GlobalArgs,
    config: &Config,
    question: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let orchestrator = Orchestrator::from_config(config)?;

    let identity = database.connection_info().identity();
    let schema = database.load_schema()?;
    let answer = orchestrator
        .answer(question, &identity, Some(&schema.schema_text), &database)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

async fn chat_command(args: &GlobalArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let orchestrator = Orchestrator::from_config(config)?;

    let session = orchestrator.open_session(&database).await?;
    chat_with_database(&orchestrator, &session, &database).await?;
    Ok(())
}

fn tables_command(args: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let tables = database.table_names()?;

    println!("📋 {} tables:", tables.len());
    for table in tables {
        println!("  {}", table);
    }
    Ok(())
}

fn describe_command(args: &GlobalArgs, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let columns = database.describe_table(table)?;
    println!("{}", format_columns(&columns));
    Ok(())
}

fn invalidate_command(args: &GlobalArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let identity = database.connection_info().identity();
    let index = querymind_rs::EmbeddingIndex::new(&config.storage.index_root);

    if index.invalidate(&identity)? {
        println!("🗑️  Dropped index {}", identity);
    } else {
        println!("No index for {}", identity);
    }
    Ok(())
}

fn stats_command(args: &GlobalArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let identity = database.connection_info().identity();
    let index = querymind_rs::EmbeddingIndex::new(&config.storage.index_root);

    match index.stats(&identity)? {
        Some(stats) => {
            println!("📊 Index {}", stats.identity);
            println!("  Entries: {}", stats.entries);
            println!("  Dimension: {}", stats.dimension);
            println!("  Metric: {}", stats.metric.as_str());
            println!("  Embedding model: {}", stats.embedding_model);
            println!("  Created: {}", stats.created_at);
        }
        None => println!("No index for {}; run `querymind-rs index` first", identity),
    }
    Ok(())
}

async fn evaluate_command(
    args: &GlobalArgs,
    config: &Config,
    gold: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = open_database(args)?;
    let orchestrator = Orchestrator::from_config(config)?;
    let cases = eval::load_gold_cases(&gold)?;

    let labels = RunLabels {
        completion_model: config.models.completion_model.clone(),
        embedding_model: config.models.embedding_model.clone(),
    };

    println!("🧪 LLM: {} | embedding: {}", labels.completion_model, labels.embedding_model);
    let session = orchestrator.open_session(&database).await?;
    println!("   Indexed {} tables, running {} questions", session.index_report.chunks_indexed, cases.len());

    let records = eval::run_evaluation(
        &orchestrator,
        &session.identity,
        Some(&session.schema_text),
        &database,
        &cases,
        &labels,
    )
    .await;

    for record in &records {
        println!(
            "{} {}: {}",
            if record.result_match { "✅" } else { "❌" },
            record.id,
            record.question
        );
    }

    let output = output.unwrap_or_else(|| PathBuf::from(eval::results_file_name(&labels)));
    eval::save_records(&output, &records)?;

    let summary = eval::summarize(&output.display().to_string(), &records);
    println!(
        "\n📈 Result match rate: {:.2} ({} cases)",
        summary.result_match_rate, summary.total
    );
    println!("   Results saved to {}", output.display());
    Ok(())
}

fn summarize_command(dir: PathBuf, output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let files = eval::find_result_files(&dir)?;
    if files.is_empty() {
        println!("No results_*.json files found.");
        return Ok(());
    }

    println!("Found result files:");
    for file in &files {
        println!("  - {}", file.display());
    }

    let summaries = eval::summarize_files(&files);
    for item in &summaries {
        println!("\nFile: {}", item.file);
        println!("  Total cases: {}", item.total);
        println!("  Result match rate: {:.2}", item.result_match_rate);
        println!("  Avg context time: {:.3}s", item.avg_time_context);
        println!("  Avg generation time: {:.3}s", item.avg_time_generate);
    }

    std::fs::write(&output, serde_json::to_string_pretty(&summaries)?)?;
    println!("\nSummary exported to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "querymind-rs",
            "ask",
            "How many users?",
            "--database",
            "shop.db",
            "-k",
            "3",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.global.top_k, Some(3));
        assert_eq!(cli.global.database, Some(PathBuf::from("shop.db")));
        assert!(matches!(cli.command, Commands::Ask { json: true, .. }));
    }
}
