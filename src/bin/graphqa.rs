use std::{path::PathBuf, process, sync::Arc};

use clap::{Parser, Subcommand};

use graphqa::{
    backend::SqliteGraphStore,
    cli::{self, CliError},
    config::GraphQaConfig,
    logging::init_logging,
};

#[derive(Parser)]
#[command(
    name = "graphqa",
    version,
    about = "Answer natural-language questions over an embedded property graph"
)]
struct Args {
    /// Database file, or `memory` for a throwaway in-memory graph.
    #[arg(long, global = true)]
    db: Option<String>,
    /// Log filter level (error, warn, info, debug, trace); overrides GRAPHQA_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full question-answering pipeline.
    Ask { question: String },
    /// Validate and execute a Cypher statement.
    Query { cypher: String },
    /// Print the graph schema as shown to the language model.
    Schema,
    /// Load a JSON seed document.
    Seed { file: PathBuf },
    /// Print node and relationship counts.
    Status,
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    match run(args) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(err.exit_code());
        }
    }
}

fn run(args: Args) -> Result<String, CliError> {
    // Process environment wins over `.env`; a missing file is fine.
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(CliError::Usage(format!("failed to read .env: {err}")));
        }
    }
    let mut config = GraphQaConfig::from_env()?;
    if let Some(db) = &args.db {
        config.store.db_path = match db.as_str() {
            "memory" | ":memory:" => None,
            path => Some(PathBuf::from(path)),
        };
    }
    let store = match &config.store.db_path {
        Some(path) => SqliteGraphStore::open(path)?,
        None => SqliteGraphStore::in_memory()?,
    };
    let options = config.pipeline.clone();
    match args.command {
        Command::Ask { question } => {
            let generator = config.build_generator()?;
            cli::run_ask(Arc::new(store), generator, options, &question)
        }
        Command::Query { cypher } => cli::run_query(&store, &options, &cypher),
        Command::Schema => cli::run_schema(&store, &options),
        Command::Seed { file } => cli::run_seed(&store, &file),
        Command::Status => cli::run_status(&store),
    }
}
