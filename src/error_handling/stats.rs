//! Request error statistics.
//!
//! Thread-safe counters of failed probe requests, by category.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::RequestErrorType;

/// Thread-safe request error tracker.
///
/// Every category is initialized to zero on creation so increments never allocate and
/// never take a lock. Share across tasks with `Arc`.
pub struct RequestErrorStats {
    errors: HashMap<RequestErrorType, AtomicUsize>,
}

impl RequestErrorStats {
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in RequestErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }
        RequestErrorStats { errors }
    }

    /// Increment an error counter.
    pub fn increment(&self, error: RequestErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map. \
                 This indicates a bug in RequestErrorStats initialization.",
                error
            );
        }
    }

    /// Get the count for an error type.
    pub fn count(&self, error: RequestErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total failed requests across all categories.
    pub fn total(&self) -> usize {
        self.errors.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Non-zero counters, in category order.
    pub fn snapshot(&self) -> Vec<(RequestErrorType, usize)> {
        RequestErrorType::iter()
            .map(|e| (e, self.count(e)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

impl Default for RequestErrorStats {
    fn default() -> Self {
        Self::new()
    }
}
