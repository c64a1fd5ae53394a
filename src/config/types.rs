//! Configuration types.
//!
//! This module defines the enums and structs a deployment uses to configure the scan
//! core. Loading these from a file is the caller's business; every struct derives
//! `Deserialize` and fills missing fields from its `Default`.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::config::constants::{
    DEFAULT_MAX_CONCURRENT_ENDPOINTS, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_REQUESTS_PER_SECOND, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RESOURCE_SAMPLE_INTERVAL_SECS, DEFAULT_RETENTION_DAYS, DEFAULT_USER_AGENT,
};
use crate::tenant::ResourceLimits;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Rate governor parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateGovernorConfig {
    /// Token refill rate and bucket capacity
    pub requests_per_second: u32,
    /// Maximum probe requests in flight across all scans
    pub max_concurrent_requests: usize,
}

impl Default for RateGovernorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// Scan core configuration.
///
/// # Examples
///
/// ```
/// use api_sentinel::Config;
///
/// let config = Config {
///     retention_days: 1,
///     ..Default::default()
/// };
/// assert_eq!(config.history_capacity(), 24);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Global rate and concurrency limits for outbound probe traffic
    pub rate_governor: RateGovernorConfig,

    /// Limits assigned to tenants registered without explicit limits
    pub default_tenant_limits: ResourceLimits,

    /// Days of scan history retained (24 records per day)
    pub retention_days: u32,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// HTTP User-Agent header value for probe requests
    pub user_agent: String,

    /// Endpoints of one scan probed at the same time
    pub max_concurrent_endpoints: usize,

    /// Seconds between resource samples of a running scan
    pub resource_sample_interval_secs: u64,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Maximum number of finalized scan records kept in history.
    pub fn history_capacity(&self) -> usize {
        crate::telemetry::history_capacity(self.retention_days)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_governor: RateGovernorConfig::default(),
            default_tenant_limits: ResourceLimits::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_endpoints: DEFAULT_MAX_CONCURRENT_ENDPOINTS,
            resource_sample_interval_secs: DEFAULT_RESOURCE_SAMPLE_INTERVAL_SECS,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("verbose").is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("Plain").unwrap(), LogFormat::Plain);
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.rate_governor.requests_per_second, 10);
        assert_eq!(config.rate_governor.max_concurrent_requests, 5);
        assert_eq!(config.request_timeout_seconds, 10);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.history_capacity(), 168);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"rate_governor": {"requests_per_second": 3}, "retention_days": 2, "log_format": "json"}"#,
        )
        .unwrap();
        assert_eq!(config.rate_governor.requests_per_second, 3);
        assert_eq!(config.rate_governor.max_concurrent_requests, 5);
        assert_eq!(config.history_capacity(), 48);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_tenant_limits, ResourceLimits::default());
    }
}
