//! Scan lifecycle management.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::execution::ScanRun;
use super::scoring::summarize;
use super::types::{Endpoint, EndpointResult, ScanJob, ScanReport, ScanStatus, ScanStatusSnapshot};
use crate::config::Config;
use crate::error_handling::{AdmissionError, InitializationError, ScanError};
use crate::initialization::{init_client, init_governor, init_telemetry, init_tenant_guard};
use crate::rate_governor::RateGovernor;
use crate::resources::{ProcessSampler, ResourceSampler};
use crate::telemetry::TelemetryAggregator;
use crate::tenant::TenantGuard;

/// Buffered completion reports per subscriber
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Execution knobs taken from `Config`.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Endpoints of one scan whose probe batteries run at the same time
    pub max_concurrent_endpoints: usize,
    /// Interval between resource samples and progress log lines
    pub sample_interval: Duration,
    /// Finished scans kept for status and report lookups
    pub retained_scans: usize,
}

impl From<&Config> for ScanSettings {
    fn from(config: &Config) -> Self {
        ScanSettings {
            max_concurrent_endpoints: config.max_concurrent_endpoints.max(1),
            sample_interval: Duration::from_secs(config.resource_sample_interval_secs.max(1)),
            retained_scans: config.history_capacity(),
        }
    }
}

/// Shared state of one scan: the job, its stop signal and its status channel.
pub(crate) struct ScanHandle {
    job: RwLock<ScanJob>,
    pub(crate) cancel: CancellationToken,
    status_tx: watch::Sender<ScanStatus>,
}

impl ScanHandle {
    fn new(job: ScanJob) -> Self {
        let (status_tx, _) = watch::channel(job.status);
        ScanHandle {
            job: RwLock::new(job),
            cancel: CancellationToken::new(),
            status_tx,
        }
    }

    pub(crate) fn job(&self) -> RwLockReadGuard<'_, ScanJob> {
        self.job.read().unwrap_or_else(|e| e.into_inner())
    }

    fn job_mut(&self) -> RwLockWriteGuard<'_, ScanJob> {
        self.job.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn push_result(&self, result: EndpointResult) {
        self.job_mut().results.push(result);
    }

    /// Applies a forward transition and publishes it to waiters.
    pub(crate) fn transition(&self, next: ScanStatus) -> bool {
        let moved = self.job_mut().transition(next);
        if moved {
            self.status_tx.send_replace(next);
        }
        moved
    }

    /// Cancels the scan unless it already finished, returning the terminal status
    /// in that case.
    ///
    /// Runs under the job lock, like [`finish`](Self::finish), so a stop accepted
    /// here is always seen by the final transition.
    pub(crate) fn request_stop(&self) -> Result<(), ScanStatus> {
        let job = self.job_mut();
        if job.status.is_terminal() {
            return Err(job.status);
        }
        self.cancel.cancel();
        Ok(())
    }

    /// Applies the terminal transition. A `Completed` outcome becomes `Stopped` when
    /// a stop was accepted, even after the last endpoint finished.
    pub(crate) fn finish(&self, outcome: ScanStatus) -> ScanStatus {
        let status = {
            let mut job = self.job_mut();
            let status = if outcome == ScanStatus::Completed && self.cancel.is_cancelled() {
                ScanStatus::Stopped
            } else {
                outcome
            };
            if !job.transition(status) {
                return job.status;
            }
            status
        };
        self.status_tx.send_replace(status);
        status
    }

    /// Final report, once the scan is terminal.
    pub(crate) fn report(&self) -> Option<ScanReport> {
        let job = self.job();
        if !job.status.is_terminal() {
            return None;
        }
        let summary = summarize(&job.results);
        Some(ScanReport {
            scan_id: job.scan_id.clone(),
            tenant_id: job.tenant_id.clone(),
            status: job.status,
            started_at: job.started_at,
            completed_at: job.completed_at,
            total_endpoints: job.endpoints.len(),
            results: job.results.clone(),
            average_score: summary.average_score,
            risk_level: summary.risk_level,
            vulnerabilities: summary.vulnerabilities,
        })
    }
}

/// Runs security scans for tenants.
///
/// A scan is admitted by the tenant guard, tracked in telemetry from the moment it is
/// admitted, and executed in the background: endpoints are dispatched concurrently
/// (bounded per scan), every endpoint runs the eight probes concurrently, and every
/// probe request passes the shared rate governor.
///
/// # Examples
///
/// ```no_run
/// use api_sentinel::{Config, Endpoint, ScanOrchestrator};
///
/// # async fn run() -> anyhow::Result<()> {
/// let orchestrator = ScanOrchestrator::from_config(&Config::default())?;
/// orchestrator.tenants().register_with_defaults("acme", "Acme Corp");
///
/// let scan_id = orchestrator
///     .start_scan("acme", vec![Endpoint::get("https://api.example.com/users")])
///     .await?;
/// if let Some(report) = orchestrator.wait(&scan_id).await {
///     println!("{:?} risk", report.risk_level);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ScanOrchestrator {
    governor: Arc<RateGovernor>,
    tenants: Arc<TenantGuard>,
    telemetry: Arc<TelemetryAggregator>,
    client: Arc<reqwest::Client>,
    sampler: Arc<dyn ResourceSampler>,
    settings: ScanSettings,
    scans: RwLock<HashMap<String, Arc<ScanHandle>>>,
    sequence: AtomicU64,
    reports: broadcast::Sender<Arc<ScanReport>>,
}

impl ScanOrchestrator {
    /// Creates an orchestrator over shared, injected components.
    pub fn new(
        governor: Arc<RateGovernor>,
        tenants: Arc<TenantGuard>,
        telemetry: Arc<TelemetryAggregator>,
        client: Arc<reqwest::Client>,
        config: &Config,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        ScanOrchestrator {
            governor,
            tenants,
            telemetry,
            client,
            sampler: Arc::new(ProcessSampler::new()),
            settings: ScanSettings::from(config),
            scans: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            reports,
        }
    }

    /// Builds every shared component from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, InitializationError> {
        let client = init_client(config)?;
        Ok(Self::new(
            init_governor(config),
            init_tenant_guard(config),
            init_telemetry(config),
            client,
            config,
        ))
    }

    /// Replaces the process resource sampler.
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn tenants(&self) -> &Arc<TenantGuard> {
        &self.tenants
    }

    pub fn telemetry(&self) -> &Arc<TelemetryAggregator> {
        &self.telemetry
    }

    fn read_scans(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ScanHandle>>> {
        self.scans.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_scans(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ScanHandle>>> {
        self.scans.write().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, scan_id: &str) -> Option<Arc<ScanHandle>> {
        self.read_scans().get(scan_id).map(Arc::clone)
    }

    fn next_scan_id(&self) -> String {
        format!(
            "scan_{}_{}",
            Utc::now().timestamp_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Admits and starts a scan, returning its id.
    ///
    /// The scan runs in the background; follow it with [`status`](Self::status) or
    /// [`wait`](Self::wait).
    ///
    /// # Errors
    ///
    /// Any `AdmissionError` from the tenant guard. A rejected scan leaves no job, no
    /// telemetry record and no quota usage behind.
    pub async fn start_scan(
        &self,
        tenant_id: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<String, AdmissionError> {
        let slot = self
            .tenants
            .admit(tenant_id, endpoints.len())
            .inspect_err(|e| warn!("Rejected scan for tenant {}: {}", tenant_id, e))?;

        let scan_id = self.next_scan_id();
        if let Err(e) = self
            .telemetry
            .start_scan(&scan_id, tenant_id, endpoints.len())
            .await
        {
            warn!("Telemetry for scan {} not opened: {}", scan_id, e);
        }

        let endpoint_count = endpoints.len();
        let handle = Arc::new(ScanHandle::new(ScanJob::new(
            scan_id.clone(),
            tenant_id.to_string(),
            endpoints,
        )));
        {
            let mut scans = self.write_scans();
            prune_finished(&mut scans, self.settings.retained_scans);
            scans.insert(scan_id.clone(), Arc::clone(&handle));
        }
        info!(
            "Admitted scan {} for tenant {} ({} endpoints)",
            scan_id, tenant_id, endpoint_count
        );

        let run = ScanRun {
            handle,
            slot,
            governor: Arc::clone(&self.governor),
            telemetry: Arc::clone(&self.telemetry),
            client: Arc::clone(&self.client),
            sampler: Arc::clone(&self.sampler),
            settings: self.settings.clone(),
            reports: self.reports.clone(),
        };
        tokio::spawn(run.execute());
        Ok(scan_id)
    }

    /// Requests a cooperative stop.
    ///
    /// Endpoints already dispatched finish their probes; the rest never start. Once
    /// this returns `Ok` the scan ends as `Stopped`, unless it had no endpoint that
    /// could be probed, which ends it as `Failed`.
    pub fn stop(&self, scan_id: &str) -> Result<(), ScanError> {
        let handle = self
            .handle(scan_id)
            .ok_or_else(|| ScanError::NotFound(scan_id.to_string()))?;
        handle
            .request_stop()
            .map_err(|status| ScanError::AlreadyFinished {
                scan_id: scan_id.to_string(),
                status: status.to_string(),
            })?;
        info!("Stop requested for scan {}", scan_id);
        Ok(())
    }

    /// Requests a stop of every scan that has not finished.
    pub fn stop_all(&self) -> usize {
        let scans = self.read_scans();
        let mut stopped = 0;
        for handle in scans.values() {
            if handle.request_stop().is_ok() {
                stopped += 1;
            }
        }
        if stopped > 0 {
            info!("Stop requested for {} running scans", stopped);
        }
        stopped
    }

    pub fn status(&self, scan_id: &str) -> Option<ScanStatusSnapshot> {
        self.handle(scan_id).map(|h| h.job().snapshot())
    }

    /// Status of every retained scan, optionally for one tenant, oldest first.
    pub fn list_scans(&self, tenant_id: Option<&str>) -> Vec<ScanStatusSnapshot> {
        let mut snapshots: Vec<ScanStatusSnapshot> = self
            .read_scans()
            .values()
            .map(|h| h.job().snapshot())
            .filter(|s| tenant_id.map_or(true, |t| s.tenant_id == t))
            .collect();
        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.scan_id.cmp(&b.scan_id))
        });
        snapshots
    }

    /// The final report of a finished scan; `None` while it runs or if unknown.
    pub fn report(&self, scan_id: &str) -> Option<ScanReport> {
        self.handle(scan_id).and_then(|h| h.report())
    }

    /// Waits until the scan is terminal and returns its report.
    pub async fn wait(&self, scan_id: &str) -> Option<ScanReport> {
        let handle = self.handle(scan_id)?;
        let mut status_rx = handle.status_tx.subscribe();
        if status_rx.wait_for(|s| s.is_terminal()).await.is_err() {
            warn!("Status channel of scan {} closed before it finished", scan_id);
        }
        handle.report()
    }

    /// Receives the report of every scan that finishes from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<Arc<ScanReport>> {
        self.reports.subscribe()
    }
}

/// Drops the oldest finished scans so at most `keep` remain.
fn prune_finished(scans: &mut HashMap<String, Arc<ScanHandle>>, keep: usize) {
    let mut finished: Vec<(chrono::DateTime<Utc>, String)> = scans
        .iter()
        .filter_map(|(id, h)| {
            let job = h.job();
            job.status
                .is_terminal()
                .then(|| (job.completed_at.unwrap_or(job.created_at), id.clone()))
        })
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        scans.remove(&id);
    }
}
