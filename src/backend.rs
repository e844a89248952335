//! Graph store contract consumed by the pipeline. [`SqliteGraphStore`] adapts
//! [`SqliteGraph`] plus the Cypher interpreter to it; tests substitute their
//! own implementations.

use std::{path::Path, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    cypher,
    errors::{CypherError, GraphStoreError},
    graph::SqliteGraph,
    result_set::ResultSet,
    schema::SchemaSnapshot,
};

pub trait GraphStore: Send + Sync {
    /// One round trip returning every label, relationship type and property.
    fn fetch_schema(&self, timeout: Duration) -> Result<SchemaSnapshot, GraphStoreError>;

    /// Parses and runs one statement, bounded by `timeout`.
    fn run(&self, query: &str, timeout: Duration) -> Result<ResultSet, CypherError>;
}

pub struct SqliteGraphStore {
    graph: Mutex<SqliteGraph>,
}

impl SqliteGraphStore {
    pub fn in_memory() -> Result<Self, GraphStoreError> {
        Ok(Self::from_graph(SqliteGraph::open_in_memory()?))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphStoreError> {
        Ok(Self::from_graph(SqliteGraph::open(path)?))
    }

    pub fn from_graph(graph: SqliteGraph) -> Self {
        Self {
            graph: Mutex::new(graph),
        }
    }

    /// Runs `f` with exclusive access to the graph.
    pub fn with_graph<T>(&self, f: impl FnOnce(&SqliteGraph) -> T) -> T {
        f(&self.graph.lock())
    }

    fn acquire(
        &self,
        timeout: Duration,
    ) -> Result<parking_lot::MutexGuard<'_, SqliteGraph>, GraphStoreError> {
        self.graph
            .try_lock_for(timeout)
            .ok_or(GraphStoreError::Timeout(timeout))
    }
}

impl GraphStore for SqliteGraphStore {
    fn fetch_schema(&self, timeout: Duration) -> Result<SchemaSnapshot, GraphStoreError> {
        let graph = self.acquire(timeout)?;
        let deadline = graph.arm_deadline(timeout);
        let snapshot = introspect(&graph).map_err(|err| {
            if deadline.expired() {
                GraphStoreError::Timeout(timeout)
            } else {
                err
            }
        })?;
        debug!(
            labels = snapshot.labels().count(),
            relationship_types = snapshot.relationship_types().count(),
            "schema introspected"
        );
        Ok(snapshot)
    }

    fn run(&self, query: &str, timeout: Duration) -> Result<ResultSet, CypherError> {
        let parsed = cypher::parse(query)?;
        let graph = self.acquire(timeout)?;
        let tx = graph.transaction()?;
        let deadline = graph.arm_deadline(timeout);
        let outcome = cypher::execute(&graph, &parsed, &deadline);
        let expired = deadline.expired();
        // Disarm before the transaction ends so rollback cannot be interrupted.
        drop(deadline);
        let result = outcome.map_err(|err| match err {
            CypherError::Store(_) if expired => {
                CypherError::Store(GraphStoreError::Timeout(timeout))
            }
            other => other,
        })?;
        if parsed.is_mutating() {
            tx.commit()
                .map_err(|e| GraphStoreError::query(e.to_string()))?;
        }
        Ok(result)
    }
}

/// Builds a snapshot from the labels, types, properties and relationship
/// patterns currently stored.
pub fn introspect(graph: &SqliteGraph) -> Result<SchemaSnapshot, GraphStoreError> {
    let mut snapshot = SchemaSnapshot::new();
    for label in graph.labels()? {
        snapshot = snapshot.with_label(&label, std::iter::empty::<String>());
    }
    for rel_type in graph.relationship_types()? {
        snapshot = snapshot.with_relationship(&rel_type, std::iter::empty::<String>());
    }
    for (label, key) in graph.node_property_keys()? {
        snapshot = snapshot.with_label(&label, [key]);
    }
    for (rel_type, key) in graph.relationship_property_keys()? {
        snapshot = snapshot.with_relationship(&rel_type, [key]);
    }
    for (start, rel_type, end) in graph.relationship_patterns()? {
        snapshot = snapshot.with_pattern(&start, &rel_type, &end);
    }
    Ok(snapshot)
}

impl<T> GraphStore for &T
where
    T: GraphStore + ?Sized,
{
    fn fetch_schema(&self, timeout: Duration) -> Result<SchemaSnapshot, GraphStoreError> {
        (**self).fetch_schema(timeout)
    }

    fn run(&self, query: &str, timeout: Duration) -> Result<ResultSet, CypherError> {
        (**self).run(query, timeout)
    }
}

impl<T> GraphStore for Arc<T>
where
    T: GraphStore + ?Sized,
{
    fn fetch_schema(&self, timeout: Duration) -> Result<SchemaSnapshot, GraphStoreError> {
        (**self).fetch_schema(timeout)
    }

    fn run(&self, query: &str, timeout: Duration) -> Result<ResultSet, CypherError> {
        (**self).run(query, timeout)
    }
}
