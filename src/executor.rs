use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    backend::GraphStore,
    errors::{
        CypherError, ExecutionError, ExecutionErrorKind, GraphStoreError, PipelineError,
        TimeoutSource,
    },
    result_set::ResultSet,
    synthesizer::GeneratedQuery,
};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs validated queries against a [`GraphStore`] with a per-query timeout.
pub struct QueryExecutor<S> {
    store: S,
    timeout: Duration,
}

impl<S: GraphStore> QueryExecutor<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn execute(&self, query: &GeneratedQuery) -> Result<ResultSet, PipelineError> {
        let results = self
            .store
            .run(query.as_str(), self.timeout)
            .map_err(|err| classify(err, self.timeout))?;
        if !results.stats.is_empty() {
            warn!(stats = ?results.stats, "query modified the graph");
        }
        debug!(rows = results.len(), "query executed");
        Ok(results)
    }
}

/// Maps interpreter and store failures onto the pipeline's error kinds.
pub fn classify(err: CypherError, timeout: Duration) -> PipelineError {
    let kind = match &err {
        CypherError::Store(GraphStoreError::Timeout(_)) => {
            return PipelineError::timeout(TimeoutSource::Execution, timeout);
        }
        CypherError::Syntax { .. } | CypherError::Semantic(_) => ExecutionErrorKind::Syntax,
        CypherError::Unsupported(_) => ExecutionErrorKind::Unsupported,
        CypherError::Type(_) => ExecutionErrorKind::Type,
        CypherError::Constraint(_) | CypherError::Store(GraphStoreError::ConstraintViolation(_)) => {
            ExecutionErrorKind::ConstraintViolation
        }
        CypherError::Store(_) => ExecutionErrorKind::Storage,
    };
    ExecutionError::new(kind, err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_not_execution_errors() {
        let err = classify(
            CypherError::Store(GraphStoreError::Timeout(Duration::from_millis(5))),
            Duration::from_millis(5),
        );
        assert!(matches!(
            err,
            PipelineError::Timeout {
                source_call: TimeoutSource::Execution,
                ..
            }
        ));
    }

    #[test]
    fn semantic_errors_read_as_syntax() {
        let err = classify(CypherError::semantic("x not defined"), DEFAULT_QUERY_TIMEOUT);
        match err {
            PipelineError::Execution(e) => assert_eq!(e.kind, ExecutionErrorKind::Syntax),
            other => panic!("unexpected {other:?}"),
        }
    }
}
