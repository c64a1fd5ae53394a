//! Shared resource initialization.
//!
//! This module builds the shared, injected dependencies of the scan core:
//! - HTTP client (timeouts, user agent, no redirects)
//! - Logger
//! - Rate governor, tenant guard and telemetry aggregator from a `Config`

mod client;
mod logger;

use std::sync::Arc;

pub use client::init_client;
pub use logger::init_logger_with;

use crate::config::Config;
use crate::rate_governor::RateGovernor;
use crate::telemetry::TelemetryAggregator;
use crate::tenant::TenantGuard;

/// Initializes the global rate governor from config.
pub fn init_governor(config: &Config) -> Arc<RateGovernor> {
    Arc::new(RateGovernor::new(
        config.rate_governor.requests_per_second,
        config.rate_governor.max_concurrent_requests,
    ))
}

/// Initializes an empty tenant registry using the configured default limits.
pub fn init_tenant_guard(config: &Config) -> Arc<TenantGuard> {
    Arc::new(TenantGuard::new(config.default_tenant_limits.clone()))
}

/// Initializes the telemetry aggregator with the configured retention window.
pub fn init_telemetry(config: &Config) -> Arc<TelemetryAggregator> {
    Arc::new(TelemetryAggregator::new(config.retention_days))
}
