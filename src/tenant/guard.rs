//! Tenant registry and scan admission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, Utc};

use super::types::{ResourceLimits, Tenant, TenantUsage};
use crate::config::PROBES_PER_ENDPOINT;
use crate::error_handling::AdmissionError;
use crate::rate_governor::TokenBucket;

#[derive(Debug, Clone, Copy)]
struct DailyUsage {
    day: NaiveDate,
    requests: u64,
}

impl DailyUsage {
    /// Starts a fresh count when `today` is a new UTC day.
    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            *self = DailyUsage {
                day: today,
                requests: 0,
            };
        }
    }
}

fn lock_daily(daily: &Mutex<DailyUsage>) -> MutexGuard<'_, DailyUsage> {
    daily.lock().unwrap_or_else(|e| e.into_inner())
}

struct TenantRecord {
    tenant: Tenant,
    active_scans: Arc<AtomicUsize>,
    daily: Arc<Mutex<DailyUsage>>,
    rate_bucket: Option<Arc<TokenBucket>>,
}

impl TenantRecord {
    fn new(tenant: Tenant) -> Self {
        let rate_bucket = tenant
            .limits
            .rate_limit
            .map(|rps| Arc::new(TokenBucket::new(rps)));
        TenantRecord {
            tenant,
            active_scans: Arc::new(AtomicUsize::new(0)),
            daily: Arc::new(Mutex::new(DailyUsage {
                day: Utc::now().date_naive(),
                requests: 0,
            })),
            rate_bucket,
        }
    }

    fn daily(&self) -> MutexGuard<'_, DailyUsage> {
        lock_daily(&self.daily)
    }
}

/// Charges the requests one scan actually sends to its tenant's daily budget.
///
/// Admission reserves an estimate up front. Requests draw on that reservation
/// first and are charged one by one once it is used up; whatever is left of it is
/// handed back when the scan's slot is dropped. After the scan the tenant has been
/// charged exactly the requests that were sent.
pub struct RequestMeter {
    daily: Arc<Mutex<DailyUsage>>,
    reserved_on: NaiveDate,
    reserved: AtomicU64,
    sent: AtomicU64,
}

impl RequestMeter {
    /// Counts one outgoing request.
    pub fn record_request(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let from_reservation = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !from_reservation {
            let mut daily = lock_daily(&self.daily);
            daily.roll(Utc::now().date_naive());
            daily.requests += 1;
        }
    }

    /// Requests sent so far.
    pub fn requests_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns the unused reservation. A reservation from a day that has since
    /// rolled over was already cleared with it.
    fn release_reservation(&self) {
        let unused = self.reserved.swap(0, Ordering::SeqCst);
        if unused == 0 {
            return;
        }
        let mut daily = lock_daily(&self.daily);
        if daily.day == self.reserved_on {
            daily.requests = daily.requests.saturating_sub(unused);
        }
    }
}

/// Admission ticket for one scan.
///
/// Holds one of the tenant's concurrent-scan slots until dropped, which the
/// orchestrator does when the scan reaches a terminal state. Dropping it also
/// settles the scan's request charge.
pub struct ScanSlot {
    tenant_id: String,
    active_scans: Arc<AtomicUsize>,
    rate_bucket: Option<Arc<TokenBucket>>,
    meter: Arc<RequestMeter>,
}

impl ScanSlot {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The tenant's own rate bucket, if its limits carry a rate override.
    pub fn rate_bucket(&self) -> Option<Arc<TokenBucket>> {
        self.rate_bucket.as_ref().map(Arc::clone)
    }

    /// The meter every request of this scan must be counted on.
    pub fn request_meter(&self) -> Arc<RequestMeter> {
        Arc::clone(&self.meter)
    }

    pub fn requests_sent(&self) -> u64 {
        self.meter.requests_sent()
    }
}

impl Drop for ScanSlot {
    fn drop(&mut self) {
        self.meter.release_reservation();
        self.active_scans.fetch_sub(1, Ordering::SeqCst);
        log::debug!(
            "Released scan slot for tenant {} after {} requests",
            self.tenant_id,
            self.meter.requests_sent()
        );
    }
}

/// Validates prospective scans against tenant status and quotas.
///
/// Read-mostly: admission takes the registry read lock, administrative updates take
/// the write lock. Per-tenant counters are atomics (concurrent scans) or a short
/// mutex (daily requests), so admissions for different tenants never contend.
pub struct TenantGuard {
    tenants: RwLock<HashMap<String, TenantRecord>>,
    default_limits: ResourceLimits,
}

impl TenantGuard {
    pub fn new(default_limits: ResourceLimits) -> Self {
        TenantGuard {
            tenants: RwLock::new(HashMap::new()),
            default_limits,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TenantRecord>> {
        self.tenants.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TenantRecord>> {
        self.tenants.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Checks, in order: tenant exists, tenant active, endpoint count, concurrent
    /// scans, daily request budget.
    ///
    /// On success one concurrent-scan slot is taken and an estimate of one request
    /// per probe per endpoint is reserved from today's budget. The estimate only
    /// gates admission: the scan's [`RequestMeter`] replaces it with the requests
    /// actually sent, which for most endpoints is more. On failure no counter moves.
    ///
    /// # Errors
    ///
    /// Returns the first `AdmissionError` the scan runs into.
    pub fn admit(&self, tenant_id: &str, endpoint_count: usize) -> Result<ScanSlot, AdmissionError> {
        self.admit_on(tenant_id, endpoint_count, Utc::now().date_naive())
    }

    pub(crate) fn admit_on(
        &self,
        tenant_id: &str,
        endpoint_count: usize,
        today: NaiveDate,
    ) -> Result<ScanSlot, AdmissionError> {
        let tenants = self.read();
        let record = tenants
            .get(tenant_id)
            .ok_or_else(|| AdmissionError::TenantNotFound(tenant_id.to_string()))?;
        let limits = &record.tenant.limits;

        if !record.tenant.is_active {
            return Err(AdmissionError::TenantInactive(tenant_id.to_string()));
        }

        if endpoint_count > limits.max_endpoints_per_scan {
            return Err(AdmissionError::TooManyEndpoints {
                requested: endpoint_count,
                limit: limits.max_endpoints_per_scan,
            });
        }

        let limit = limits.max_concurrent_scans;
        record
            .active_scans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < limit).then_some(active + 1)
            })
            .map_err(|active| AdmissionError::ConcurrentScanLimit { active, limit })?;

        let requested = endpoint_count as u64 * PROBES_PER_ENDPOINT;
        {
            let mut daily = record.daily();
            daily.roll(today);
            if daily.requests + requested > limits.max_requests_per_day {
                record.active_scans.fetch_sub(1, Ordering::SeqCst);
                return Err(AdmissionError::DailyQuotaExceeded {
                    used: daily.requests,
                    requested,
                    limit: limits.max_requests_per_day,
                });
            }
            daily.requests += requested;
        }

        Ok(ScanSlot {
            tenant_id: tenant_id.to_string(),
            active_scans: Arc::clone(&record.active_scans),
            rate_bucket: record.rate_bucket.as_ref().map(Arc::clone),
            meter: Arc::new(RequestMeter {
                daily: Arc::clone(&record.daily),
                reserved_on: today,
                reserved: AtomicU64::new(requested),
                sent: AtomicU64::new(0),
            }),
        })
    }

    /// Registers a tenant, replacing any tenant with the same id.
    ///
    /// Replacing keeps the tenant's running-scan and daily counters.
    pub fn register(&self, tenant: Tenant) {
        let mut tenants = self.write();
        match tenants.get_mut(&tenant.id) {
            Some(record) => {
                let limits = tenant.limits.clone();
                record.tenant = tenant;
                Self::apply_rate_limit(record, &limits);
            }
            None => {
                log::info!("Registered tenant {} ({})", tenant.id, tenant.name);
                tenants.insert(tenant.id.clone(), TenantRecord::new(tenant));
            }
        }
    }

    /// Registers an active tenant with the guard's default limits.
    pub fn register_with_defaults(&self, id: &str, name: &str) -> Tenant {
        let tenant = Tenant::new(id, name, self.default_limits.clone());
        self.register(tenant.clone());
        tenant
    }

    fn apply_rate_limit(record: &mut TenantRecord, limits: &ResourceLimits) {
        let current = record.rate_bucket.as_ref().map(|b| b.rate());
        let wanted = limits.rate_limit.map(f64::from);
        if current != wanted {
            record.rate_bucket = limits.rate_limit.map(|rps| Arc::new(TokenBucket::new(rps)));
        }
    }

    /// Replaces a tenant's limits. Running scans keep the rate bucket they were
    /// admitted with.
    pub fn update_limits(&self, tenant_id: &str, limits: ResourceLimits) -> Result<(), AdmissionError> {
        let mut tenants = self.write();
        let record = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| AdmissionError::TenantNotFound(tenant_id.to_string()))?;
        Self::apply_rate_limit(record, &limits);
        record.tenant.limits = limits;
        log::info!("Updated limits for tenant {}", tenant_id);
        Ok(())
    }

    /// Activates or deactivates a tenant. Running scans are not affected.
    pub fn set_active(&self, tenant_id: &str, is_active: bool) -> Result<(), AdmissionError> {
        let mut tenants = self.write();
        let record = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| AdmissionError::TenantNotFound(tenant_id.to_string()))?;
        record.tenant.is_active = is_active;
        log::info!(
            "Tenant {} {}",
            tenant_id,
            if is_active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    /// Removes a tenant from the registry.
    pub fn remove(&self, tenant_id: &str) -> Option<Tenant> {
        self.write().remove(tenant_id).map(|record| record.tenant)
    }

    pub fn tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.read().get(tenant_id).map(|record| record.tenant.clone())
    }

    /// All registered tenants, sorted by id.
    pub fn tenants(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self.read().values().map(|r| r.tenant.clone()).collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        tenants
    }

    /// Current quota consumption. A stale daily counter reports zero for today.
    pub fn usage(&self, tenant_id: &str) -> Option<TenantUsage> {
        let today = Utc::now().date_naive();
        self.read().get(tenant_id).map(|record| {
            let daily = *record.daily();
            TenantUsage {
                active_scans: record.active_scans.load(Ordering::SeqCst),
                requests_today: if daily.day == today { daily.requests } else { 0 },
                day: today,
            }
        })
    }
}

impl Default for TenantGuard {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}
