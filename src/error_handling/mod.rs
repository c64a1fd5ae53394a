//! Error handling and request error statistics.
//!
//! This module provides:
//! - Error type definitions for every subsystem (admission, scan control, telemetry,
//!   initialization)
//! - Request error categorization for failed probe requests
//! - Thread-safe request error counters
//!
//! Failed probe requests are findings, not errors: they are categorized and counted
//! here, then folded into a failed probe result by the probe that issued them.

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{categorize_reqwest_error, update_error_stats};
pub use stats::RequestErrorStats;
pub use types::{AdmissionError, InitializationError, RequestErrorType, ScanError, TelemetryError};

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_request_error_stats_initialization() {
        let stats = RequestErrorStats::new();
        for error_type in RequestErrorType::iter() {
            assert_eq!(stats.count(error_type), 0);
        }
        assert_eq!(stats.total(), 0);
        assert!(stats.snapshot().is_empty());
    }

    #[test]
    fn test_request_error_stats_increment() {
        let stats = RequestErrorStats::new();
        stats.increment(RequestErrorType::Timeout);
        stats.increment(RequestErrorType::Timeout);
        stats.increment(RequestErrorType::Connect);

        assert_eq!(stats.count(RequestErrorType::Timeout), 2);
        assert_eq!(stats.count(RequestErrorType::Connect), 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(
            stats.snapshot(),
            vec![
                (RequestErrorType::Timeout, 2),
                (RequestErrorType::Connect, 1)
            ]
        );
    }
}
