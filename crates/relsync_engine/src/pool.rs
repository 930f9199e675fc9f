//! Bounded background execution.

use crate::error::{SyncError, SyncResult};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Runs background jobs on a tokio runtime and bounds how many of them talk
/// to remote systems at the same time.
///
/// Jobs are spawned freely; a job takes a permit only for the duration of a
/// remote call and gives it back before sleeping or waiting on another job.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    /// Creates a pool on the given runtime.
    pub fn new(runtime: Handle, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Creates a pool on the runtime of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PoolClosed`] if called outside a tokio runtime.
    pub fn try_current(max_workers: usize) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SyncError::PoolClosed)?;
        Ok(Self::new(runtime, max_workers))
    }

    /// Spawns a job. Callable from any thread, inside or outside the runtime.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(job)
    }

    /// Waits for a worker slot.
    pub async fn acquire(&self) -> SyncResult<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::PoolClosed)
    }

    /// Runs `call` while holding a worker slot.
    pub async fn run<F, T>(&self, call: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        let _permit = self.acquire().await?;
        call.await
    }

    /// Stops handing out new permits. Jobs waiting for a slot fail with
    /// [`SyncError::PoolClosed`].
    pub fn close(&self) {
        self.permits.close();
    }

    /// Number of free worker slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured worker bound.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}
