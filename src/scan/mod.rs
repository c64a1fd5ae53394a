//! Scan orchestration.
//!
//! This module drives a scan from admission to its final report:
//! - `ScanOrchestrator`: admission, background execution, stop, status and reports
//! - Probes: the eight security checks run against every endpoint
//! - Scoring: endpoint score, scan average and risk level
//!
//! Scans move `Pending → Running → Completed | Stopped | Failed`, never backwards.

mod context;
mod execution;
mod orchestrator;
mod probes;
mod scoring;
mod types;

pub use orchestrator::{ScanOrchestrator, ScanSettings};
pub use probes::{ProbeKind, ProbeResult, Severity};
pub use scoring::{score_endpoint, summarize, RiskLevel, ScanSummary};
pub use types::{
    Endpoint, EndpointResult, HttpMethod, ScanReport, ScanStatus, ScanStatusSnapshot,
    SeverityCounts,
};
