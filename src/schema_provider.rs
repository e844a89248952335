use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    backend::GraphStore,
    cache::SchemaCache,
    errors::{GraphStoreError, PipelineError, TimeoutSource},
    schema::SchemaSnapshot,
};

/// Fetches the graph schema, serving a cached snapshot while it is fresh.
pub struct SchemaProvider<S> {
    store: S,
    cache: SchemaCache,
    timeout: Duration,
}

impl<S: GraphStore> SchemaProvider<S> {
    pub fn new(store: S, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            cache: SchemaCache::new(ttl),
            timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// At most one round trip to the store.
    pub fn get_schema(&self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        if let Some(snapshot) = self.cache.get() {
            debug!("schema served from cache");
            return Ok(snapshot);
        }
        self.refresh()
    }

    /// Fetches unconditionally and replaces the cached snapshot.
    pub fn refresh(&self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        let snapshot = self
            .store
            .fetch_schema(self.timeout)
            .map(Arc::new)
            .map_err(|err| match err {
                GraphStoreError::Timeout(elapsed) => {
                    PipelineError::timeout(TimeoutSource::SchemaFetch, elapsed)
                }
                other => PipelineError::backend(other.to_string()),
            })?;
        self.cache.insert(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drops the cached snapshot, typically after a write.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}
