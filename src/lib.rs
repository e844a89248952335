//! Natural-language question answering over an embedded SQLite property graph.
//!
//! A question flows through [`pipeline::Pipeline`]: the graph schema is
//! fetched, a language model writes a Cypher query, the query is checked
//! against the schema, executed, and the rows are turned back into prose.
//!
//! The `graphqa` binary wraps the same pipeline; see [`cli`] for its commands.

pub mod backend;
pub mod bench_utils;
pub mod cache;
pub mod cli;
pub mod config;
pub mod cypher;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod result_set;
pub mod schema;
pub mod schema_provider;
pub mod seed;
pub mod service;
pub mod synthesizer;
pub mod validator;

pub use crate::backend::{GraphStore, SqliteGraphStore};
pub use crate::errors::{
    CypherError, ExecutionError, ExecutionErrorKind, GenerationError, GraphStoreError,
    PipelineError, TimeoutSource, ValidationError, ValidationErrorKind,
};
pub use crate::graph::{GraphNode, GraphRelationship, NodeSpec, RelationshipSpec, SqliteGraph};
pub use crate::llm::TextGenerator;
pub use crate::pipeline::{Pipeline, PipelineOptions, PipelineOutcome};
pub use crate::result_set::ResultSet;
pub use crate::schema::SchemaSnapshot;
pub use crate::synthesizer::GeneratedQuery;
