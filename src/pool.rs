//! Bounded pool for background agent invocations

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs invocation work on the tokio runtime with at most `size` units
/// executing at once. Excess work waits for a permit.
#[derive(Debug, Clone)]
pub struct InvocationPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl InvocationPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by running work
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Submit work. The handle resolves when the work finishes and can be
    /// aborted; dropping it detaches the work without cancelling it.
    pub fn spawn<F, T>(&self, work: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            work.await
        })
    }
}
