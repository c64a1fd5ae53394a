//! Background execution of one admitted scan.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use strum::IntoEnumIterator;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::context::{ProbeContext, ScanCounters};
use super::orchestrator::{ScanHandle, ScanSettings};
use super::probes::{ProbeKind, ProbeResult};
use super::scoring::score_endpoint;
use super::types::{Endpoint, EndpointResult, ScanReport, ScanStatus};
use crate::app::{log_progress, shutdown_gracefully};
use crate::config::SAMPLER_SHUTDOWN_TIMEOUT;
use crate::error_handling::{RequestErrorStats, RequestErrorType};
use crate::rate_governor::{RateGovernor, TokenBucket};
use crate::resources::ResourceSampler;
use crate::telemetry::TelemetryAggregator;
use crate::tenant::{RequestMeter, ScanSlot};

/// Everything a scan needs once admitted. Consumed by [`ScanRun::execute`].
pub(crate) struct ScanRun {
    pub handle: Arc<ScanHandle>,
    pub slot: ScanSlot,
    pub governor: Arc<RateGovernor>,
    pub telemetry: Arc<TelemetryAggregator>,
    pub client: Arc<reqwest::Client>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub settings: ScanSettings,
    pub reports: broadcast::Sender<Arc<ScanReport>>,
}

/// Shared inputs of every endpoint unit of one scan.
struct EndpointUnit {
    scan_id: String,
    handle: Arc<ScanHandle>,
    telemetry: Arc<TelemetryAggregator>,
    client: Arc<reqwest::Client>,
    governor: Arc<RateGovernor>,
    tenant_bucket: Option<Arc<TokenBucket>>,
    meter: Arc<RequestMeter>,
    error_stats: Arc<RequestErrorStats>,
    counters: Arc<ScanCounters>,
    completed: Arc<AtomicUsize>,
}

/// Parses an endpoint URL; only `http` and `https` targets can be probed.
fn parse_endpoint_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

/// Result with every probe failed for the same reason.
fn all_probes_failed(endpoint: &Endpoint, reason: &str) -> EndpointResult {
    let results: Vec<ProbeResult> = ProbeKind::iter()
        .map(|probe| ProbeResult::failed(probe, reason))
        .collect();
    EndpointResult {
        url: endpoint.url.clone(),
        score: score_endpoint(&results),
        results,
    }
}

impl EndpointUnit {
    /// Runs the probe battery against one endpoint and records the result.
    async fn run(self: Arc<Self>, endpoint: Endpoint) {
        let (result, response_time) = self.probe(endpoint).await;
        self.record(result, response_time).await;
    }

    async fn probe(&self, endpoint: Endpoint) -> (EndpointResult, Duration) {
        let url = match parse_endpoint_url(&endpoint.url) {
            Ok(url) => url,
            Err(e) => {
                self.error_stats.increment(RequestErrorType::InvalidUrl);
                let reason = format!("{}: {}", RequestErrorType::InvalidUrl, e);
                return (all_probes_failed(&endpoint, &reason), Duration::ZERO);
            }
        };

        let ctx = Arc::new(ProbeContext::new(
            Arc::clone(&self.client),
            Arc::clone(&self.governor),
            self.tenant_bucket.as_ref().map(Arc::clone),
            Arc::clone(&self.meter),
            Arc::clone(&self.error_stats),
            Arc::clone(&self.counters),
            url,
        ));
        let endpoint = Arc::new(endpoint);

        let probes: Vec<_> = ProbeKind::iter()
            .map(|probe| {
                let ctx = Arc::clone(&ctx);
                let endpoint = Arc::clone(&endpoint);
                (
                    probe,
                    tokio::spawn(async move { probe.run(&ctx, &endpoint).await }),
                )
            })
            .collect();

        // Joined in battery order so results keep the fixed probe order
        let mut results = Vec::with_capacity(probes.len());
        for (probe, task) in probes {
            match task.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!("Probe {} on {} panicked: {}", probe, endpoint.url, join_error);
                    results.push(ProbeResult::failed(
                        probe,
                        format!("Probe task failed: {}", join_error),
                    ));
                }
            }
        }

        let result = EndpointResult {
            url: endpoint.url.clone(),
            score: score_endpoint(&results),
            results,
        };
        (result, ctx.average_latency())
    }

    async fn record(&self, result: EndpointResult, response_time: Duration) {
        debug!(
            "Scan {}: {} scored {} ({} probes failed)",
            self.scan_id,
            result.url,
            result.score,
            result.failed_probes().count()
        );
        if let Err(e) = self
            .telemetry
            .record_endpoint_test(&self.scan_id, &result.url, response_time, &result.results)
            .await
        {
            debug!("Endpoint result of scan {} not recorded: {}", self.scan_id, e);
        }
        self.handle.push_result(result);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScanRun {
    fn monitor(&self) -> MonitorRun {
        MonitorRun {
            sampler: Arc::clone(&self.sampler),
            governor: Arc::clone(&self.governor),
            telemetry: Arc::clone(&self.telemetry),
        }
    }

    pub(crate) async fn execute(self) {
        let (scan_id, tenant_id, endpoints) = {
            let job = self.handle.job();
            (job.scan_id.clone(), job.tenant_id.clone(), job.endpoints.clone())
        };
        let total = endpoints.len();

        let unit = Arc::new(EndpointUnit {
            scan_id: scan_id.clone(),
            handle: Arc::clone(&self.handle),
            telemetry: Arc::clone(&self.telemetry),
            client: Arc::clone(&self.client),
            governor: Arc::clone(&self.governor),
            tenant_bucket: self.slot.rate_bucket(),
            meter: self.slot.request_meter(),
            error_stats: self.telemetry.request_errors(),
            counters: Arc::new(ScanCounters::default()),
            completed: Arc::new(AtomicUsize::new(0)),
        });

        if !endpoints.iter().any(|e| parse_endpoint_url(&e.url).is_ok()) {
            // Invalid endpoints still get a result each
            for endpoint in endpoints {
                let (result, response_time) = unit.probe(endpoint).await;
                unit.record(result, response_time).await;
            }
            warn!(
                "Scan {} for tenant {} has no endpoint that can be probed",
                scan_id, tenant_id
            );
            self.finish(ScanStatus::Failed).await;
            return;
        }

        self.handle.transition(ScanStatus::Running);
        info!(
            "Scan {} started for tenant {}: {} endpoints",
            scan_id, tenant_id, total
        );
        let start_time = Instant::now();

        let monitor_cancel = CancellationToken::new();
        let monitor_task = spawn_monitor(
            &self,
            Arc::clone(&unit),
            start_time,
            total,
            monitor_cancel.child_token(),
        );

        let endpoint_slots = Arc::new(Semaphore::new(self.settings.max_concurrent_endpoints));
        let mut tasks = FuturesUnordered::new();
        let cancel = &self.handle.cancel;

        for endpoint in endpoints {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&endpoint_slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Endpoint semaphore closed, dispatch of scan {} ends", scan_id);
                        break;
                    }
                },
            };
            // A stop that raced the permit still wins
            if cancel.is_cancelled() {
                break;
            }

            let unit = Arc::clone(&unit);
            let fallback = endpoint.clone();
            tasks.push(
                tokio::spawn(async move {
                    let _permit = permit;
                    unit.run(endpoint).await;
                })
                .map(move |joined| (fallback, joined)),
            );
        }

        if cancel.is_cancelled() {
            info!(
                "Scan {} stopping: {} endpoints dispatched, {} skipped",
                scan_id,
                tasks.len(),
                total - tasks.len()
            );
        }

        while let Some((endpoint, joined)) = tasks.next().await {
            if let Err(join_error) = joined {
                warn!("Endpoint task for {} panicked: {:?}", endpoint.url, join_error);
                let result =
                    all_probes_failed(&endpoint, &format!("Endpoint task failed: {}", join_error));
                unit.record(result, Duration::ZERO).await;
            }
        }

        shutdown_gracefully(monitor_cancel, Some(monitor_task), SAMPLER_SHUTDOWN_TIMEOUT).await;
        self.monitor().sample(&unit).await;
        log_progress(&scan_id, start_time, &unit.completed, total);

        let status = if cancel.is_cancelled() {
            ScanStatus::Stopped
        } else {
            ScanStatus::Completed
        };
        self.finish(status).await;
    }

    /// Archives telemetry, frees the tenant slot and settles its request charge,
    /// then publishes the terminal status.
    async fn finish(self, outcome: ScanStatus) {
        let ScanRun {
            handle,
            slot,
            telemetry,
            reports,
            ..
        } = self;
        let scan_id = handle.job().scan_id.clone();

        if let Err(e) = telemetry.end_scan(&scan_id).await {
            warn!("Telemetry of scan {} not archived: {}", scan_id, e);
        }
        let requests = slot.requests_sent();
        drop(slot);
        handle.finish(outcome);

        if let Some(report) = handle.report() {
            info!(
                "Scan {} {}: {}/{} endpoints, {} requests, average score {}, risk {}, {} vulnerabilities",
                scan_id,
                report.status,
                report.results.len(),
                report.total_endpoints,
                requests,
                report
                    .average_score
                    .map_or_else(|| "n/a".to_string(), |s| format!("{:.1}", s)),
                report
                    .risk_level
                    .map_or_else(|| "n/a".to_string(), |r| r.to_string()),
                report.vulnerabilities.total()
            );
            // No subscribers is fine
            let _ = reports.send(Arc::new(report));
        }
    }
}

/// Periodically samples resources and logs progress until cancelled.
fn spawn_monitor(
    run: &ScanRun,
    unit: Arc<EndpointUnit>,
    start_time: Instant,
    total: usize,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let monitor = run.monitor();
    let period = run.settings.sample_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    monitor.sample(&unit).await;
                    log_progress(&unit.scan_id, start_time, &unit.completed, total);
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
    })
}

/// The parts of a [`ScanRun`] resource sampling needs.
struct MonitorRun {
    sampler: Arc<dyn ResourceSampler>,
    governor: Arc<RateGovernor>,
    telemetry: Arc<TelemetryAggregator>,
}

impl MonitorRun {
    /// Takes one resource sample and records it against the scan.
    async fn sample(&self, unit: &EndpointUnit) {
        let process = self.sampler.sample().unwrap_or_else(|e| {
            debug!("Resource sampler failed: {:#}", e);
            Default::default()
        });
        let sample = crate::resources::ResourceSample {
            concurrent_tasks: self.governor.in_flight(),
            network_bytes: unit.counters.network_bytes.load(Ordering::Relaxed),
            ..process
        };
        if let Err(e) = self.telemetry.record_resource_usage(&unit.scan_id, sample).await {
            debug!("Resource sample not recorded: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_url() {
        assert!(parse_endpoint_url("https://api.example.com/v1/users").is_ok());
        assert!(parse_endpoint_url("http://127.0.0.1:8080/").is_ok());
        assert!(parse_endpoint_url("not a url").is_err());
        assert_eq!(
            parse_endpoint_url("ftp://files.example.com/").unwrap_err(),
            "unsupported scheme 'ftp'"
        );
    }

    #[test]
    fn test_all_probes_failed_scores_zero() {
        let result = all_probes_failed(&Endpoint::get("::bad::"), "invalid endpoint URL");
        assert_eq!(result.score, 0);
        assert_eq!(result.results.len(), 8);
        assert!(result.results.iter().all(|r| !r.passed));
        assert_eq!(result.url, "::bad::");
    }
}
