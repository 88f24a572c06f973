//! Bounded pool of inbound connection slots

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{ProxyError, Result};

/// Limits how many inbound connections are served at once
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    active_count: Arc<AtomicUsize>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a pool with `max_connections` slots
    ///
    /// # Errors
    ///
    /// Returns error if `max_connections` is 0
    pub fn new(max_connections: usize) -> Result<Self> {
        if max_connections == 0 {
            return Err(ProxyError::ConfigError(
                "max_connections must be > 0".to_string(),
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            active_count: Arc::new(AtomicUsize::new(0)),
            max_connections,
        })
    }

    /// Take a slot if one is free right now
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.guard(permit))
    }

    fn guard(&self, permit: OwnedSemaphorePermit) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            _permit: permit,
            active_count: Arc::clone(&self.active_count),
        }
    }

    /// Connections currently being served
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Configured number of slots
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Releases its slot when the connection task ends
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
    }
}
