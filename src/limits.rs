use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission control for in-flight transport attempts.
///
/// A permit covers exactly one transport call: it is acquired right before the
/// call and dropped right after, so a request waiting out a throttle backoff
/// or a credential refresh holds no slot and cannot starve unrelated traffic.
/// Waiters are admitted strictly in arrival order.
#[derive(Clone)]
pub(crate) struct InFlightLimiter {
    semaphore: Arc<Semaphore>,
}

impl InFlightLimiter {
    pub(crate) fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Park until a slot frees up. Returns `None` only if the semaphore was
    /// closed, which this crate never does.
    pub(crate) async fn acquire(&self) -> Option<InFlightPermit> {
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => Some(InFlightPermit { _permit: permit }),
            Err(_) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// RAII slot reservation; dropping it hands the slot to the longest waiter.
pub(crate) struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}
