use std::{fmt, time::Duration};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("graph store call exceeded {0:?}")]
    Timeout(Duration),
}

impl GraphStoreError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::QueryError(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::InvalidInput(msg.into())
    }

    pub fn constraint<T: Into<String>>(msg: T) -> Self {
        GraphStoreError::ConstraintViolation(msg.into())
    }
}

/// Failure while parsing or interpreting a Cypher statement.
#[derive(Debug, Error)]
pub enum CypherError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("semantic error: {0}")]
    Semantic(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error(transparent)]
    Store(#[from] GraphStoreError),
}

impl CypherError {
    pub fn syntax<T: Into<String>>(message: T, offset: usize) -> Self {
        CypherError::Syntax {
            message: message.into(),
            offset,
        }
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        CypherError::Unsupported(msg.into())
    }

    pub fn semantic<T: Into<String>>(msg: T) -> Self {
        CypherError::Semantic(msg.into())
    }

    pub fn type_error<T: Into<String>>(msg: T) -> Self {
        CypherError::Type(msg.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template references unknown slot `{0}`")]
    UnknownSlot(String),
    #[error("template uses slot `{0}` that it does not declare")]
    UndeclaredSlot(&'static str),
    #[error("declared slot `{0}` never appears in the template")]
    UnusedSlot(&'static str),
    #[error("no value supplied for slot `{0}`")]
    MissingValue(&'static str),
    #[error("value supplied for slot `{0}`, which the template does not declare")]
    UnexpectedValue(&'static str),
    #[error("unbalanced brace at offset {0}")]
    Unbalanced(usize),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation exceeded {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("provider returned an empty completion")]
    Empty,
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    pub fn request<T: Into<String>>(msg: T) -> Self {
        GenerationError::Request(msg.into())
    }

    pub fn invalid_response<T: Into<String>>(msg: T) -> Self {
        GenerationError::InvalidResponse(msg.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationErrorKind {
    UnknownLabel,
    UnknownRelationship,
    UnknownProperty,
    /// Write clause rejected by [`crate::validator::WritePolicy::Reject`].
    MutatingQuery,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationErrorKind::UnknownLabel => "unknown label",
            ValidationErrorKind::UnknownRelationship => "unknown relationship type",
            ValidationErrorKind::UnknownProperty => "unknown property",
            ValidationErrorKind::MutatingQuery => "write clause not permitted",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{kind} `{identifier}`")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub identifier: String,
}

impl ValidationError {
    pub fn new<T: Into<String>>(kind: ValidationErrorKind, identifier: T) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ExecutionErrorKind {
    Syntax,
    Unsupported,
    ConstraintViolation,
    Type,
    Storage,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExecutionErrorKind::Syntax => "syntax error",
            ExecutionErrorKind::Unsupported => "unsupported construct",
            ExecutionErrorKind::ConstraintViolation => "constraint violation",
            ExecutionErrorKind::Type => "type error",
            ExecutionErrorKind::Storage => "storage error",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new<T: Into<String>>(kind: ExecutionErrorKind, message: T) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// External call that ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TimeoutSource {
    SchemaFetch,
    Generation,
    Execution,
}

impl fmt::Display for TimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TimeoutSource::SchemaFetch => "schema fetch",
            TimeoutSource::Generation => "text generation",
            TimeoutSource::Execution => "query execution",
        };
        f.write_str(text)
    }
}

/// Classified failure of one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("graph store unavailable: {0}")]
    BackendUnavailable(String),
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("query rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("query execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("{source_call} timed out after {elapsed:?}")]
    Timeout {
        source_call: TimeoutSource,
        elapsed: Duration,
    },
}

impl PipelineError {
    pub fn backend<T: Into<String>>(msg: T) -> Self {
        PipelineError::BackendUnavailable(msg.into())
    }

    pub fn synthesis<T: Into<String>>(msg: T) -> Self {
        PipelineError::SynthesisFailed(msg.into())
    }

    pub fn timeout(source_call: TimeoutSource, elapsed: Duration) -> Self {
        PipelineError::Timeout {
            source_call,
            elapsed,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineError::BackendUnavailable(_) => "BackendUnavailable",
            PipelineError::SynthesisFailed(_) => "SynthesisFailed",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::Execution(_) => "ExecutionError",
            PipelineError::Timeout { .. } => "Timeout",
        }
    }

    /// HTTP-equivalent status. Every current kind is a server error.
    pub fn status_code(&self) -> u16 {
        500
    }
}
