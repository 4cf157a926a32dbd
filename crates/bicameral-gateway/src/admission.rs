//! Admission control
//!
//! Two semaphores: `capacity` holds one permit per admissible request
//! (`max_in_flight + queue_depth`) and is only ever `try_acquire`d, so an
//! over-limit request is rejected at once; `running` holds `max_in_flight`
//! permits and is awaited by admitted requests waiting in the queue.

use bicameral_core::{Error, GatewayConfig, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

pub struct Admission {
    capacity: Arc<Semaphore>,
    running: Arc<Semaphore>,
    limit: usize,
}

/// Held for the whole traversal; releases both slots on drop.
pub struct AdmissionPermit {
    _running: OwnedSemaphorePermit,
    _slot: OwnedSemaphorePermit,
}

impl Admission {
    pub fn new(max_in_flight: usize, queue_depth: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        let limit = max_in_flight + queue_depth;
        Self {
            capacity: Arc::new(Semaphore::new(limit)),
            running: Arc::new(Semaphore::new(max_in_flight)),
            limit,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.max_in_flight, config.queue_depth)
    }

    /// Total requests admitted at once, queued ones included.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Requests currently admitted (running or queued).
    pub fn admitted(&self) -> usize {
        self.limit - self.capacity.available_permits()
    }

    /// Reject immediately past the limit; otherwise wait for a running slot.
    pub async fn admit(&self) -> Result<AdmissionPermit> {
        let slot = self.capacity.clone().try_acquire_owned().map_err(|_| {
            warn!("Overloaded: {} requests already admitted", self.limit);
            Error::Overloaded { limit: self.limit }
        })?;
        let running = self
            .running
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("admission closed".into()))?;
        Ok(AdmissionPermit { _running: running, _slot: slot })
    }
}
