use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use rusqlite::Connection;

use crate::errors::GraphStoreError;

/// SQLite virtual-machine instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Bounds every statement issued on a connection while the guard is alive.
///
/// A progress handler interrupts the running statement once the deadline has
/// passed; the interrupted call surfaces as an ordinary query error, so callers
/// consult [`DeadlineGuard::expired`] to reclassify it. Rust-side loops call
/// [`DeadlineGuard::check`] between statements. Dropping the guard removes the
/// handler.
pub struct DeadlineGuard<'a> {
    conn: &'a Connection,
    timeout: Duration,
    deadline: Instant,
    tripped: Arc<AtomicBool>,
}

impl<'a> DeadlineGuard<'a> {
    pub(crate) fn arm(conn: &'a Connection, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let tripped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&tripped);
        conn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || {
                if Instant::now() >= deadline {
                    flag.store(true, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }),
        );
        Self {
            conn,
            timeout,
            deadline,
            tripped,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expired(&self) -> bool {
        self.tripped.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }

    pub fn check(&self) -> Result<(), GraphStoreError> {
        if self.expired() {
            self.tripped.store(true, Ordering::SeqCst);
            return Err(GraphStoreError::Timeout(self.timeout));
        }
        Ok(())
    }
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
