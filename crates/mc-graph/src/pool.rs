//! Bounded graph-store session pool.
//!
//! The pool is the only shared mutable resource in the write path. A
//! session is a permit to open transactions; acquisition is bounded by the
//! configured timeout and the request deadline, whichever is sooner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mc_core::config::GraphConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::StoreError;
use crate::store::{GraphStore, GraphTransaction, TxOptions};

/// Semaphore-bounded pool over a shared [`GraphStore`].
pub struct SessionPool {
    store: Arc<dyn GraphStore>,
    semaphore: Arc<Semaphore>,
    max_sessions: usize,
    acquire_timeout: Duration,
}

impl SessionPool {
    pub fn new(store: Arc<dyn GraphStore>, config: &GraphConfig) -> Self {
        tracing::info!(max_sessions = config.max_sessions, "graph session pool created");
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(config.max_sessions)),
            max_sessions: config.max_sessions,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    /// Acquire a session, waiting at most the configured timeout (bounded
    /// further by `deadline` when one is set). Pool exhaustion surfaces as
    /// a transient `Unavailable` so callers may retry.
    pub async fn acquire(&self, deadline: Option<Instant>) -> Result<GraphSession, StoreError> {
        let mut wait = self.acquire_timeout;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if deadline <= now {
                return Err(StoreError::DeadlineExceeded);
            }
            wait = wait.min(deadline - now);
        }

        let permit = tokio::time::timeout(wait, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| StoreError::unavailable("session pool exhausted", true))?
            .map_err(|_| StoreError::unavailable("session pool closed", false))?;

        Ok(GraphSession { store: Arc::clone(&self.store), _permit: permit })
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_sessions: self.max_sessions,
            available: self.semaphore.available_permits(),
        }
    }
}

/// One checked-out session. The permit returns to the pool on drop.
pub struct GraphSession {
    store: Arc<dyn GraphStore>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSession").finish_non_exhaustive()
    }
}

impl GraphSession {
    pub async fn begin(
        &self,
        options: TxOptions,
    ) -> Result<Box<dyn GraphTransaction>, StoreError> {
        self.store.begin(options).await
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub max_sessions: usize,
    pub available: usize,
}
