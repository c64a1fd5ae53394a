//! Tenant resource guard.
//!
//! This module owns the tenant registry and decides whether a scan may start:
//! - Tenant must exist and be active
//! - Endpoint count must fit `max_endpoints_per_scan`
//! - Running scans must stay below `max_concurrent_scans`
//! - An estimate of one request per probe per endpoint must fit the remaining
//!   daily budget
//!
//! Admitted scans are charged for the requests they actually send through a
//! [`RequestMeter`]. The daily budget resets at the start of each UTC calendar day.

mod guard;
mod types;

pub use guard::{RequestMeter, ScanSlot, TenantGuard};
pub use types::{ResourceLimits, Tenant, TenantUsage};
