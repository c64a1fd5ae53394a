//! Configuration constants.
//!
//! This module defines all configuration constants used throughout the scan core,
//! including governor defaults, tenant quota defaults, timeouts, probe penalties and
//! telemetry limits.

use std::time::Duration;

// Rate governor defaults
/// Requests per second admitted by the governor when unconfigured
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;
/// Maximum in-flight probe requests when unconfigured
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;

// Scan execution
/// Maximum endpoints of a single scan whose probe batteries run at the same time.
/// This bounds endpoint dispatch only; in-flight requests are bounded by the governor.
pub const DEFAULT_MAX_CONCURRENT_ENDPOINTS: usize = 5;
/// Per-request timeout in seconds
/// A stalled target releases its governor slot after at most this long
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// Interval between resource samples (and progress log lines) for a running scan
pub const DEFAULT_RESOURCE_SAMPLE_INTERVAL_SECS: u64 = 5;
/// Number of probes in the battery. Admission reserves this many requests per endpoint.
pub const PROBES_PER_ENDPOINT: u64 = 8;
/// Starting score of every endpoint before penalties are applied
pub const MAX_ENDPOINT_SCORE: i32 = 100;

// Tenant quota defaults
/// Scans a tenant may run at the same time
pub const DEFAULT_MAX_CONCURRENT_SCANS: usize = 5;
/// Endpoints accepted in one scan
pub const DEFAULT_MAX_ENDPOINTS_PER_SCAN: usize = 100;
/// Probe requests a tenant may issue per UTC day
pub const DEFAULT_MAX_REQUESTS_PER_DAY: u64 = 10_000;

// Telemetry
/// Days of hourly scan history retained by the aggregator
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
/// History records kept per retention day (one per hour)
pub const HISTORY_RECORDS_PER_DAY: usize = 24;
/// Size of the most-vulnerable-endpoints list in tenant metrics
pub const TOP_VULNERABLE_ENDPOINTS: usize = 10;
/// Prefix of every metric name in the Prometheus export
pub const METRICS_PREFIX: &str = "api_sentinel";

/// Default User-Agent string for probe requests.
///
/// Identifies the scanner honestly so target operators can recognise (and allow-list)
/// assessment traffic in their logs.
pub const DEFAULT_USER_AGENT: &str = concat!("api_sentinel/", env!("CARGO_PKG_VERSION"));

// Response and body size limits
/// Maximum response body size in bytes read by a probe (2MB)
/// Larger bodies are truncated before inspection to prevent memory exhaustion
pub const MAX_RESPONSE_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Maximum length of a probe finding message (500 chars)
pub const MAX_PROBE_MESSAGE_LENGTH: usize = 500;

/// Grace period granted to the resource sampling task on shutdown
pub const SAMPLER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
