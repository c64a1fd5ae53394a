//! api_sentinel library: multi-tenant API security scanning core
//!
//! This library runs batteries of security probes against HTTP API endpoints on behalf
//! of tenants, under shared rate and concurrency limits, and aggregates what every scan
//! found into queryable telemetry.
//!
//! The building blocks are shared and injected:
//! - [`RateGovernor`]: token bucket plus concurrency semaphore every probe request
//!   passes through
//! - [`TenantGuard`]: tenant registry and scan admission (quotas, concurrent scans)
//! - [`TelemetryAggregator`]: live and historical scan metrics, tenant and system views
//! - [`ScanOrchestrator`]: runs admitted scans and reports their results
//!
//! # Example
//!
//! ```no_run
//! use api_sentinel::{Config, Endpoint, ScanOrchestrator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! api_sentinel::initialization::init_logger_with(
//!     config.log_level.clone().into(),
//!     config.log_format.clone(),
//! )?;
//!
//! let orchestrator = ScanOrchestrator::from_config(&config)?;
//! orchestrator.tenants().register_with_defaults("acme", "Acme Corp");
//!
//! let scan_id = orchestrator
//!     .start_scan(
//!         "acme",
//!         vec![Endpoint::get("https://api.example.com/v1/users")],
//!     )
//!     .await?;
//!
//! let report = orchestrator.wait(&scan_id).await.expect("scan is known");
//! println!(
//!     "Scan {} finished {}: average score {:?}, risk {:?}",
//!     report.scan_id, report.status, report.average_score, report.risk_level
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Scans run as background tasks on the
//! runtime that called [`ScanOrchestrator::start_scan`].

mod app;
pub mod config;
mod error_handling;
pub mod initialization;
pub mod rate_governor;
pub mod resources;
pub mod scan;
pub mod telemetry;
pub mod tenant;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel, RateGovernorConfig};
pub use error_handling::{
    AdmissionError, InitializationError, RequestErrorStats, RequestErrorType, ScanError,
    TelemetryError,
};
pub use rate_governor::{GovernorPermit, RateGovernor, RateGovernorState, TokenBucket};
pub use resources::{ProcessSampler, ResourceSample, ResourceSampler};
pub use scan::{
    Endpoint, EndpointResult, HttpMethod, ProbeKind, ProbeResult, RiskLevel, ScanOrchestrator,
    ScanReport, ScanStatus, ScanStatusSnapshot, Severity, SeverityCounts,
};
pub use telemetry::{ScanMetrics, SystemMetrics, TelemetryAggregator, TenantMetrics};
pub use tenant::{RequestMeter, ResourceLimits, ScanSlot, Tenant, TenantGuard, TenantUsage};
