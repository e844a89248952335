//! Cypher subset: lexer, parser and an interpreter over [`SqliteGraph`].
//!
//! Reading clauses (`MATCH`, `OPTIONAL MATCH`, `WITH`, `UNWIND`, `RETURN`) and
//! the basic write clauses (`CREATE`, `SET`, `DELETE`) are executed. Clauses
//! outside that set parse into [`CypherError::Unsupported`].
//!
//! [`SqliteGraph`]: crate::graph::SqliteGraph
//! [`CypherError::Unsupported`]: crate::errors::CypherError::Unsupported

pub mod ast;
mod eval;
mod exec;
pub mod lexer;
mod parser;
mod value;

pub use exec::execute;
pub use parser::parse;
pub use value::Value;
