//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (governor defaults, quotas, timeouts, limits)
//! - HTTP header name constants used by the probes
//! - Configuration types

mod constants;
mod headers;
mod types;

// Re-export all constants
pub use constants::*;
pub use headers::*;
pub use types::{Config, LogFormat, LogLevel, RateGovernorConfig};
