//! Progress logging utilities.

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Logs progress of a running scan.
///
/// # Arguments
///
/// * `scan_id` - The scan being reported on
/// * `start_time` - When the scan started running
/// * `completed_endpoints` - Counter of endpoints whose probe battery finished
/// * `total_endpoints` - Endpoints in the scan
pub fn log_progress(
    scan_id: &str,
    start_time: Instant,
    completed_endpoints: &AtomicUsize,
    total_endpoints: usize,
) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let completed = completed_endpoints.load(Ordering::SeqCst);
    let rate = if elapsed_secs > 0.0 {
        completed as f64 / elapsed_secs
    } else {
        0.0
    };
    info!(
        "Scan {}: {}/{} endpoints in {:.2} seconds (~{:.2} endpoints/sec)",
        scan_id, completed, total_endpoints, elapsed_secs, rate
    );
}
