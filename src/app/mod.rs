//! Scan runtime helpers.
//!
//! This module provides progress logging and shutdown handling for the background
//! tasks that accompany a running scan.

pub mod logging;
pub mod shutdown;

// Re-export public API
pub use logging::log_progress;
pub use shutdown::shutdown_gracefully;
