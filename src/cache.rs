use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

use crate::schema::SchemaSnapshot;

/// Holds the most recent schema snapshot for `ttl`. A zero TTL never caches.
pub struct SchemaCache {
    ttl: Duration,
    inner: RwLock<Option<(Instant, Arc<SchemaSnapshot>)>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self) -> Option<Arc<SchemaSnapshot>> {
        if self.ttl.is_zero() {
            return None;
        }
        self.inner
            .read()
            .as_ref()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, snapshot)| Arc::clone(snapshot))
    }

    pub fn insert(&self, snapshot: Arc<SchemaSnapshot>) {
        if self.ttl.is_zero() {
            return;
        }
        *self.inner.write() = Some((Instant::now(), snapshot));
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }
}
