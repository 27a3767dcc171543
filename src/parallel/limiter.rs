use crate::process::TaskError;
use std::future::Future;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Bounded-permit gate that caps how many wrapped calls run at once.
///
/// Permits are handed out in FIFO order, so every waiter eventually gets one.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` permits, clamped to `1..=Semaphore::MAX_PERMITS`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Limiter sized to the number of logical CPUs
    pub fn with_available_cpus() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held
    pub fn held(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for a permit, then run `work` while holding it.
    ///
    /// The permit is released however `work` ends. If `cancel` fires before a
    /// permit is granted, `work` is never started.
    pub async fn run<F, T>(&self, cancel: &CancellationToken, work: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, TaskError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            permit = self.semaphore.acquire() => {
                // The semaphore is never closed
                permit.map_err(|_| TaskError::Cancelled)?
            }
        };
        tracing::debug!(held = self.held(), capacity = self.capacity, "Permit acquired");

        work.await
    }
}
