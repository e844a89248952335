//! Command handlers behind the `graphqa` binary. Each returns the text to
//! print; JSON for everything except `schema`.

use std::{path::Path, sync::Arc, time::Duration};

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::{
    backend::SqliteGraphStore,
    config::ConfigError,
    errors::{GraphStoreError, PipelineError},
    executor::QueryExecutor,
    llm::TextGenerator,
    pipeline::{Pipeline, PipelineOptions, run_checked_query},
    schema_provider::SchemaProvider,
    seed::{SeedDocument, load_seed},
    synthesizer::GeneratedQuery,
    validator::QueryValidator,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("usage: {0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] GraphStoreError),
    #[error("{} ({})", .0, .0.kind_name())]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// 2 for usage and configuration problems, 1 for failed commands.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Config(_) => 2,
            CliError::Store(_) | CliError::Pipeline(_) => 1,
        }
    }
}

pub fn run_ask<G: TextGenerator>(
    store: Arc<SqliteGraphStore>,
    generator: G,
    options: PipelineOptions,
    question: &str,
) -> Result<String, CliError> {
    let pipeline = Pipeline::from_shared(store, Arc::new(generator), options);
    let outcome = pipeline.answer(question)?;
    let mut object = Map::new();
    object.insert("command".into(), Value::String("ask".into()));
    object.insert("question".into(), Value::String(outcome.question));
    object.insert("answer".into(), Value::String(outcome.answer));
    object.insert("query".into(), Value::String(outcome.query));
    object.insert("rows".into(), json!(outcome.rows));
    object.insert("mutating".into(), Value::Bool(outcome.mutating));
    encode(object)
}

pub fn run_query(
    store: &SqliteGraphStore,
    options: &PipelineOptions,
    cypher: &str,
) -> Result<String, CliError> {
    if cypher.trim().is_empty() {
        return Err(CliError::Usage("query requires a Cypher statement".into()));
    }
    // One-shot process: caching the schema would never pay off.
    let provider = SchemaProvider::new(store, Duration::ZERO, options.schema_timeout);
    let validator = QueryValidator::new(options.write_policy);
    let executor = QueryExecutor::new(store, options.query_timeout);
    let checked = run_checked_query(&provider, &validator, &executor, &GeneratedQuery::new(cypher))?;
    let mut object = Map::new();
    object.insert("command".into(), Value::String("query".into()));
    object.insert("columns".into(), json!(checked.results.columns));
    object.insert("rows".into(), json!(checked.results.rows));
    object.insert("mutating".into(), Value::Bool(checked.report.mutating));
    object.insert("stats".into(), json!(checked.results.stats));
    encode(object)
}

pub fn run_schema(store: &SqliteGraphStore, options: &PipelineOptions) -> Result<String, CliError> {
    let provider = SchemaProvider::new(store, Duration::ZERO, options.schema_timeout);
    Ok(provider.get_schema()?.render())
}

pub fn run_seed(store: &SqliteGraphStore, path: &Path) -> Result<String, CliError> {
    let doc = SeedDocument::from_file(path)?;
    let summary = store.with_graph(|graph| load_seed(graph, &doc))?;
    let mut object = Map::new();
    object.insert("command".into(), Value::String("seed".into()));
    object.insert("nodes".into(), json!(summary.nodes));
    object.insert("relationships".into(), json!(summary.relationships));
    encode(object)
}

pub fn run_status(store: &SqliteGraphStore) -> Result<String, CliError> {
    let (nodes, relationships) = store.with_graph(|graph| graph.counts())?;
    let mut object = Map::new();
    object.insert("command".into(), Value::String("status".into()));
    object.insert("nodes".into(), json!(nodes));
    object.insert("relationships".into(), json!(relationships));
    encode(object)
}

fn encode(object: Map<String, Value>) -> Result<String, CliError> {
    serde_json::to_string(&Value::Object(object))
        .map_err(|e| CliError::Store(GraphStoreError::invalid_input(format!("serialization failed: {e}"))))
}
