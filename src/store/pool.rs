//! Bounded pool of store connections.
//!
//! The embedded store needs no sockets, but each streaming query still holds
//! a permit for its whole lifetime so concurrent scans stay bounded the same
//! way an external database's connection pool bounds them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

/// A checked-out connection; returned to the pool on drop.
#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(size: usize, acquire_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        }
    }

    /// Wait up to the acquire timeout for a free connection.
    pub async fn acquire(&self) -> Result<PoolPermit> {
        let semaphore = Arc::clone(&self.semaphore);
        match tokio::time::timeout(self.acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(PoolPermit { _permit: permit }),
            Ok(Err(_)) => Err(Error::Unavailable("connection pool closed".into())),
            Err(_) => Err(Error::Unavailable(format!(
                "no store connection available after {}ms",
                self.acquire_timeout.as_millis()
            ))),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.size - self.available()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Refuse further checkouts; outstanding permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
