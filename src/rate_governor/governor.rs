//! Combined rate and concurrency governor.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::bucket::TokenBucket;
use crate::config::DEFAULT_MAX_CONCURRENT_REQUESTS;

/// Point-in-time view of the governor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateGovernorState {
    /// Tokens currently in the bucket (negative while callers wait on credit)
    pub current_tokens: f64,
    /// Bucket capacity
    pub max_tokens: f64,
    /// Tokens added per second
    pub refill_rate_per_second: f64,
    /// Concurrency slots held right now
    pub slots_in_use: usize,
    /// Total concurrency slots
    pub slots_total: usize,
}

/// Gate every outbound probe request passes through.
///
/// `acquire()` first waits for one of `max_concurrent_requests` concurrency slots, then
/// for a rate token. The returned permit holds the slot until it is released or
/// dropped; the rate token is consumed for good. Concurrency and rate are therefore
/// independent axes of backpressure. The governor never rejects, it only delays.
pub struct RateGovernor {
    bucket: TokenBucket,
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// A held concurrency slot. Dropping the permit releases the slot.
#[must_use = "dropping the permit immediately releases the concurrency slot"]
pub struct GovernorPermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl GovernorPermit {
    /// Returns the concurrency slot to the governor.
    pub fn release(self) {
        drop(self);
    }
}

impl RateGovernor {
    /// Creates a governor. Zero values fall back to the defaults (10 rps, 5 slots).
    pub fn new(requests_per_second: u32, max_concurrent_requests: usize) -> Self {
        let capacity = if max_concurrent_requests == 0 {
            log::warn!(
                "Concurrency limit of 0 is not allowed, using default of {}",
                DEFAULT_MAX_CONCURRENT_REQUESTS
            );
            DEFAULT_MAX_CONCURRENT_REQUESTS
        } else {
            max_concurrent_requests
        };
        RateGovernor {
            bucket: TokenBucket::new(requests_per_second),
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a concurrency slot and a rate token.
    pub async fn acquire(&self) -> GovernorPermit {
        let slot = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                // The semaphore is never closed; proceed unbounded rather than stall probes
                log::error!("Rate governor semaphore closed; admitting request without a slot");
                None
            }
        };
        self.bucket.take().await;
        GovernorPermit { _slot: slot }
    }

    /// Concurrency slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Total concurrency slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the bucket and slot usage.
    pub fn snapshot(&self) -> RateGovernorState {
        RateGovernorState {
            current_tokens: self.bucket.available(),
            max_tokens: self.bucket.capacity(),
            refill_rate_per_second: self.bucket.rate(),
            slots_in_use: self.in_flight(),
            slots_total: self.capacity,
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_REQUESTS_PER_SECOND,
            DEFAULT_MAX_CONCURRENT_REQUESTS,
        )
    }
}
