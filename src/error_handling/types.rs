//! Error type definitions.
//!
//! This module defines the error types of every subsystem plus the categories used to
//! classify failed probe requests.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Reasons a scan is refused by the tenant resource guard.
///
/// Admission errors are fatal to scan start and leave no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// No tenant is registered under the given id.
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// The tenant exists but has been deactivated.
    #[error("Tenant {0} is inactive")]
    TenantInactive(String),

    /// The scan has more endpoints than the tenant may submit at once.
    #[error("Scan has {requested} endpoints, tenant limit is {limit} per scan")]
    TooManyEndpoints {
        /// Endpoints in the rejected scan
        requested: usize,
        /// Tenant's `max_endpoints_per_scan`
        limit: usize,
    },

    /// The tenant already runs its maximum number of scans.
    #[error("Tenant already has {active} running scans (limit {limit})")]
    ConcurrentScanLimit {
        /// Scans currently running for the tenant
        active: usize,
        /// Tenant's `max_concurrent_scans`
        limit: usize,
    },

    /// Admitting the scan would exceed the tenant's daily request budget.
    #[error("Daily request quota exceeded: {used} used + {requested} requested > {limit}")]
    DailyQuotaExceeded {
        /// Requests already charged today
        used: u64,
        /// Minimum requests the rejected scan needs
        requested: u64,
        /// Tenant's `max_requests_per_day`
        limit: u64,
    },
}

/// Error types for scan control operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No scan with this id is known to the orchestrator.
    #[error("Scan not found: {0}")]
    NotFound(String),

    /// The scan already reached a terminal state.
    #[error("Scan {scan_id} already finished with status {status}")]
    AlreadyFinished {
        /// Scan id
        scan_id: String,
        /// Terminal status the scan holds
        status: String,
    },
}

/// Error types for the telemetry aggregator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The scan is neither live nor in history.
    #[error("Scan metrics not found: {0}")]
    NotFound(String),

    /// A write arrived for a scan that is not live (unknown, finalized or evicted).
    #[error("Scan {0} is not live; write ignored")]
    ScanNotLive(String),

    /// A live entry already exists for this scan id.
    #[error("Scan {0} is already being tracked")]
    AlreadyTracked(String),

    /// The requested export format is not supported.
    #[error("Unsupported export format: {0} (expected json or prometheus)")]
    UnsupportedFormat(String),

    /// Serializing the export failed.
    #[error("Failed to serialize metrics: {0}")]
    Serialization(String),
}

/// Categories of failed probe requests.
///
/// A failed request is a finding of the probe that issued it, never an error of the
/// scan; these categories only feed statistics and finding messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum RequestErrorType {
    Timeout,
    Connect,
    Redirect,
    Request,
    Body,
    Decode,
    Builder,
    InvalidUrl,
    Other,
}

impl std::fmt::Display for RequestErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestErrorType {
    /// Human-readable description used in finding messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestErrorType::Timeout => "request timed out",
            RequestErrorType::Connect => "connection failed",
            RequestErrorType::Redirect => "redirect error",
            RequestErrorType::Request => "request error",
            RequestErrorType::Body => "response body error",
            RequestErrorType::Decode => "response decode error",
            RequestErrorType::Builder => "request could not be built",
            RequestErrorType::InvalidUrl => "invalid endpoint URL",
            RequestErrorType::Other => "request failed",
        }
    }

    /// Snake-case label used as a Prometheus label value.
    pub fn label(&self) -> &'static str {
        match self {
            RequestErrorType::Timeout => "timeout",
            RequestErrorType::Connect => "connect",
            RequestErrorType::Redirect => "redirect",
            RequestErrorType::Request => "request",
            RequestErrorType::Body => "body",
            RequestErrorType::Decode => "decode",
            RequestErrorType::Builder => "builder",
            RequestErrorType::InvalidUrl => "invalid_url",
            RequestErrorType::Other => "other",
        }
    }
}
