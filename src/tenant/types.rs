//! Tenant data structures.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_MAX_CONCURRENT_SCANS, DEFAULT_MAX_ENDPOINTS_PER_SCAN, DEFAULT_MAX_REQUESTS_PER_DAY,
};

/// Quotas enforced for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Scans the tenant may run at the same time
    pub max_concurrent_scans: usize,
    /// Endpoints accepted in one scan
    pub max_endpoints_per_scan: usize,
    /// Probe requests charged per UTC day
    pub max_requests_per_day: u64,
    /// Optional per-tenant requests/second, applied on top of the global governor
    pub rate_limit: Option<u32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_scans: DEFAULT_MAX_CONCURRENT_SCANS,
            max_endpoints_per_scan: DEFAULT_MAX_ENDPOINTS_PER_SCAN,
            max_requests_per_day: DEFAULT_MAX_REQUESTS_PER_DAY,
            rate_limit: None,
        }
    }
}

/// An isolated organization using the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Inactive tenants are refused admission even though they are registered
    pub is_active: bool,
    pub limits: ResourceLimits,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates an active tenant with the given limits.
    pub fn new(id: impl Into<String>, name: impl Into<String>, limits: ResourceLimits) -> Self {
        Tenant {
            id: id.into(),
            name: name.into(),
            is_active: true,
            limits,
            created_at: Utc::now(),
        }
    }
}

/// Current quota consumption of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantUsage {
    /// Scans admitted and not yet finished
    pub active_scans: usize,
    /// Requests charged on `day`
    pub requests_today: u64,
    /// UTC day the request counter belongs to
    pub day: NaiveDate,
}
