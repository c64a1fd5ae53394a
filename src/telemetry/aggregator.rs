//! Live and historical scan telemetry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{EndpointVulnerabilities, ScanMetrics, SystemMetrics, TenantMetrics};
use crate::config::{HISTORY_RECORDS_PER_DAY, TOP_VULNERABLE_ENDPOINTS};
use crate::error_handling::{RequestErrorStats, TelemetryError};
use crate::resources::ResourceSample;
use crate::scan::{ProbeResult, SeverityCounts};

/// Number of archived scans kept for a retention window (24 per day, at least one day).
pub fn history_capacity(retention_days: u32) -> usize {
    retention_days.max(1) as usize * HISTORY_RECORDS_PER_DAY
}

/// Lifetime counters, unaffected by history eviction.
#[derive(Debug, Default)]
pub(crate) struct LifetimeCounters {
    pub scans_started: AtomicU64,
    pub scans_finished: AtomicU64,
    pub endpoints_tested: AtomicU64,
    pub vulnerabilities: AtomicU64,
}

/// Records per-scan telemetry and serves aggregated views.
///
/// Live scans sit in a map keyed by scan id; finished scans move into a bounded FIFO
/// history (oldest evicted first). Both are behind reader/writer locks, always taken
/// live-then-history, so a scan being archived is visible in exactly one of them.
pub struct TelemetryAggregator {
    pub(crate) live: RwLock<HashMap<String, ScanMetrics>>,
    pub(crate) history: RwLock<VecDeque<ScanMetrics>>,
    capacity: usize,
    pub(crate) counters: LifetimeCounters,
    request_errors: Arc<RequestErrorStats>,
}

impl TelemetryAggregator {
    pub fn new(retention_days: u32) -> Self {
        let capacity = history_capacity(retention_days);
        TelemetryAggregator {
            live: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            counters: LifetimeCounters::default(),
            request_errors: Arc::new(RequestErrorStats::new()),
        }
    }

    /// Maximum number of archived scans.
    pub fn history_capacity(&self) -> usize {
        self.capacity
    }

    /// Categorized probe request failures, shared with the probes that record them.
    pub fn request_errors(&self) -> Arc<RequestErrorStats> {
        Arc::clone(&self.request_errors)
    }

    /// Opens a live record for a scan.
    pub async fn start_scan(
        &self,
        scan_id: &str,
        tenant_id: &str,
        endpoint_count: usize,
    ) -> Result<(), TelemetryError> {
        let mut live = self.live.write().await;
        if live.contains_key(scan_id) {
            return Err(TelemetryError::AlreadyTracked(scan_id.to_string()));
        }
        live.insert(
            scan_id.to_string(),
            ScanMetrics::new(scan_id, tenant_id, endpoint_count, Utc::now()),
        );
        self.counters.scans_started.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn not_live(scan_id: &str, operation: &str) -> TelemetryError {
        log::warn!(
            "Telemetry {} for scan {} ignored: scan is not live",
            operation,
            scan_id
        );
        TelemetryError::ScanNotLive(scan_id.to_string())
    }

    /// Folds one endpoint's results into the live record.
    ///
    /// A write beyond the scan's endpoint count is ignored so `endpoints_tested` never
    /// exceeds `total_endpoints`.
    pub async fn record_endpoint_test(
        &self,
        scan_id: &str,
        url: &str,
        response_time: Duration,
        results: &[ProbeResult],
    ) -> Result<(), TelemetryError> {
        let mut live = self.live.write().await;
        let metrics = live
            .get_mut(scan_id)
            .ok_or_else(|| Self::not_live(scan_id, "endpoint result"))?;

        if metrics.endpoints_tested >= metrics.total_endpoints {
            log::warn!(
                "Scan {} already recorded all {} endpoints; ignoring result for {}",
                scan_id,
                metrics.total_endpoints,
                url
            );
            return Ok(());
        }

        metrics.record_response_time(response_time.as_micros() as f64 / 1000.0);
        let before = metrics.vulnerabilities.total;
        metrics.vulnerabilities.record(url, results);

        self.counters.endpoints_tested.fetch_add(1, Ordering::Relaxed);
        self.counters
            .vulnerabilities
            .fetch_add(metrics.vulnerabilities.total - before, Ordering::Relaxed);
        Ok(())
    }

    /// Overwrites the scan's latest resource snapshot.
    pub async fn record_resource_usage(
        &self,
        scan_id: &str,
        sample: ResourceSample,
    ) -> Result<(), TelemetryError> {
        let mut live = self.live.write().await;
        let metrics = live
            .get_mut(scan_id)
            .ok_or_else(|| Self::not_live(scan_id, "resource sample"))?;
        let resources = &mut metrics.resources;
        resources.cpu_percent = sample.cpu_percent;
        resources.memory_mb = sample.memory_mb;
        resources.concurrent_tasks = sample.concurrent_tasks;
        resources.network_bytes = sample.network_bytes;
        resources.disk_bytes = sample.disk_bytes;
        resources.sampled_at = Some(Utc::now());
        Ok(())
    }

    /// Finalizes a scan and moves it into history.
    pub async fn end_scan(&self, scan_id: &str) -> Result<ScanMetrics, TelemetryError> {
        self.end_scan_at(scan_id, Utc::now()).await
    }

    pub(crate) async fn end_scan_at(
        &self,
        scan_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ScanMetrics, TelemetryError> {
        let mut live = self.live.write().await;
        let mut metrics = live
            .remove(scan_id)
            .ok_or_else(|| Self::not_live(scan_id, "end of scan"))?;
        metrics.finalize(end_time);

        let mut history = self.history.write().await;
        drop(live);
        while history.len() >= self.capacity {
            if let Some(evicted) = history.pop_front() {
                log::debug!("Evicted scan {} from telemetry history", evicted.scan_id);
            }
        }
        history.push_back(metrics.clone());
        self.counters.scans_finished.fetch_add(1, Ordering::Relaxed);
        Ok(metrics)
    }

    /// The scan's record, live or archived.
    pub async fn scan_metrics(&self, scan_id: &str) -> Result<ScanMetrics, TelemetryError> {
        let live = self.live.read().await;
        if let Some(metrics) = live.get(scan_id) {
            return Ok(metrics.clone());
        }
        let history = self.history.read().await;
        history
            .iter()
            .find(|m| m.scan_id == scan_id)
            .cloned()
            .ok_or_else(|| TelemetryError::NotFound(scan_id.to_string()))
    }

    /// Number of scans currently live.
    pub async fn live_scans(&self) -> usize {
        self.live.read().await.len()
    }

    /// Archived scans that started at or after `now - window`.
    async fn history_within(&self, window: Duration) -> Vec<ScanMetrics> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w));
        self.history
            .read()
            .await
            .iter()
            .filter(|m| cutoff.map_or(true, |c| m.start_time >= c))
            .cloned()
            .collect()
    }

    /// Aggregates the tenant's archived scans within `window`.
    pub async fn tenant_metrics(&self, tenant_id: &str, window: Duration) -> TenantMetrics {
        let scans: Vec<ScanMetrics> = self
            .history_within(window)
            .await
            .into_iter()
            .filter(|m| m.tenant_id == tenant_id)
            .collect();

        let mut vulnerabilities = SeverityCounts::default();
        let mut per_endpoint: HashMap<&str, u64> = HashMap::new();
        for scan in &scans {
            vulnerabilities.merge(&scan.vulnerabilities.by_severity);
            for (url, count) in &scan.vulnerabilities.by_endpoint {
                *per_endpoint.entry(url.as_str()).or_insert(0) += count;
            }
        }

        let mut top: Vec<EndpointVulnerabilities> = per_endpoint
            .into_iter()
            .map(|(url, vulnerabilities)| EndpointVulnerabilities {
                url: url.to_string(),
                vulnerabilities,
            })
            .collect();
        top.sort_by(|a, b| {
            b.vulnerabilities
                .cmp(&a.vulnerabilities)
                .then_with(|| a.url.cmp(&b.url))
        });
        top.truncate(TOP_VULNERABLE_ENDPOINTS);

        let avg_throughput = if scans.is_empty() {
            0.0
        } else {
            scans.iter().map(|m| m.performance.throughput).sum::<f64>() / scans.len() as f64
        };

        TenantMetrics {
            tenant_id: tenant_id.to_string(),
            window_secs: window.as_secs(),
            total_scans: scans.len(),
            endpoints_tested: scans.iter().map(|m| m.endpoints_tested).sum(),
            total_vulnerabilities: scans.iter().map(|m| m.vulnerabilities.total).sum(),
            vulnerabilities,
            avg_response_time_ms: weighted_response_time(&scans),
            avg_throughput,
            top_vulnerable_endpoints: top,
        }
    }

    /// Aggregates all archived scans within `window`.
    pub async fn system_metrics(&self, window: Duration) -> SystemMetrics {
        let live_scans = self.live_scans().await;
        let scans = self.history_within(window).await;

        let mut vulnerabilities = SeverityCounts::default();
        let mut by_type = std::collections::BTreeMap::new();
        for scan in &scans {
            vulnerabilities.merge(&scan.vulnerabilities.by_severity);
            for (probe, count) in &scan.vulnerabilities.by_type {
                *by_type.entry(probe.clone()).or_insert(0) += count;
            }
        }
        let active_tenants: HashSet<&str> = scans.iter().map(|m| m.tenant_id.as_str()).collect();

        SystemMetrics {
            window_secs: window.as_secs(),
            total_scans: scans.len(),
            live_scans,
            active_tenants: active_tenants.len(),
            endpoints_tested: scans.iter().map(|m| m.endpoints_tested).sum(),
            total_vulnerabilities: scans.iter().map(|m| m.vulnerabilities.total).sum(),
            vulnerabilities,
            vulnerabilities_by_type: by_type,
            avg_response_time_ms: weighted_response_time(&scans),
        }
    }
}

/// Mean response time across scans, weighted by endpoints tested.
fn weighted_response_time(scans: &[ScanMetrics]) -> f64 {
    let tested: usize = scans.iter().map(|m| m.endpoints_tested).sum();
    if tested == 0 {
        return 0.0;
    }
    scans
        .iter()
        .map(|m| m.performance.avg_response_time_ms * m.endpoints_tested as f64)
        .sum::<f64>()
        / tested as f64
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETENTION_DAYS)
    }
}
