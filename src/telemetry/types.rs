//! Telemetry record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scan::{ProbeResult, SeverityCounts};

/// Vulnerability tallies of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityMetrics {
    pub total: u64,
    #[serde(flatten)]
    pub by_severity: SeverityCounts,
    /// Failed probes per probe name
    pub by_type: BTreeMap<String, u64>,
    /// Failed probes per endpoint URL
    pub by_endpoint: BTreeMap<String, u64>,
}

impl VulnerabilityMetrics {
    pub(crate) fn record(&mut self, url: &str, results: &[ProbeResult]) {
        for failed in results.iter().filter(|r| !r.passed) {
            self.total += 1;
            self.by_severity.add(failed.probe.severity());
            *self.by_type.entry(failed.name()).or_insert(0) += 1;
            *self.by_endpoint.entry(url.to_string()).or_insert(0) += 1;
        }
    }
}

/// Response time and throughput figures of one scan, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    /// Endpoints tested per second of scan duration; set when the scan ends
    pub throughput: f64,
    /// Vulnerabilities per tested endpoint, as a percentage; set when the scan ends
    pub error_rate: f64,
}

/// Latest resource sample of a scan. Each sample overwrites the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub concurrent_tasks: usize,
    pub network_bytes: u64,
    pub disk_bytes: u64,
    pub sampled_at: Option<DateTime<Utc>>,
}

/// Telemetry record of one scan.
///
/// Live while the scan runs, then finalized and moved into history, where it is never
/// mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub scan_id: String,
    pub tenant_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub total_endpoints: usize,
    pub endpoints_tested: usize,
    pub vulnerabilities: VulnerabilityMetrics,
    pub performance: PerformanceMetrics,
    pub resources: ResourceMetrics,
}

impl ScanMetrics {
    pub(crate) fn new(
        scan_id: &str,
        tenant_id: &str,
        total_endpoints: usize,
        start_time: DateTime<Utc>,
    ) -> Self {
        ScanMetrics {
            scan_id: scan_id.to_string(),
            tenant_id: tenant_id.to_string(),
            start_time,
            end_time: None,
            duration_secs: None,
            total_endpoints,
            endpoints_tested: 0,
            vulnerabilities: VulnerabilityMetrics::default(),
            performance: PerformanceMetrics::default(),
            resources: ResourceMetrics::default(),
        }
    }

    /// Folds one endpoint's response time into the running min/max/average.
    pub(crate) fn record_response_time(&mut self, response_time_ms: f64) {
        self.endpoints_tested += 1;
        let n = self.endpoints_tested as f64;
        let perf = &mut self.performance;
        if self.endpoints_tested == 1 {
            perf.min_response_time_ms = response_time_ms;
            perf.max_response_time_ms = response_time_ms;
        } else {
            perf.min_response_time_ms = perf.min_response_time_ms.min(response_time_ms);
            perf.max_response_time_ms = perf.max_response_time_ms.max(response_time_ms);
        }
        perf.avg_response_time_ms += (response_time_ms - perf.avg_response_time_ms) / n;
    }

    /// Stamps the end time and derives duration, throughput and error rate.
    pub(crate) fn finalize(&mut self, end_time: DateTime<Utc>) {
        let duration = (end_time - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        self.end_time = Some(end_time);
        self.duration_secs = Some(duration);

        let tested = self.endpoints_tested as f64;
        self.performance.throughput = if duration > 0.0 { tested / duration } else { 0.0 };
        self.performance.error_rate = if tested > 0.0 {
            self.vulnerabilities.total as f64 / tested * 100.0
        } else {
            0.0
        };
    }
}

/// An endpoint and the vulnerabilities found on it across a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointVulnerabilities {
    pub url: String,
    pub vulnerabilities: u64,
}

/// Aggregate of a tenant's archived scans that started within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMetrics {
    pub tenant_id: String,
    pub window_secs: u64,
    pub total_scans: usize,
    pub endpoints_tested: usize,
    pub total_vulnerabilities: u64,
    pub vulnerabilities: SeverityCounts,
    /// Mean response time weighted by endpoints tested
    pub avg_response_time_ms: f64,
    pub avg_throughput: f64,
    /// Most vulnerable endpoints, descending by count
    pub top_vulnerable_endpoints: Vec<EndpointVulnerabilities>,
}

/// Aggregate of all archived scans that started within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub window_secs: u64,
    pub total_scans: usize,
    /// Scans currently live (not part of the window aggregate)
    pub live_scans: usize,
    /// Distinct tenants with at least one scan in the window
    pub active_tenants: usize,
    pub endpoints_tested: usize,
    pub total_vulnerabilities: u64,
    pub vulnerabilities: SeverityCounts,
    pub vulnerabilities_by_type: BTreeMap<String, u64>,
    pub avg_response_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ProbeKind;

    #[test]
    fn test_vulnerability_tallies() {
        let mut vulns = VulnerabilityMetrics::default();
        vulns.record(
            "http://api.local/a",
            &[
                ProbeResult::failed(ProbeKind::InjectionTest, "sql"),
                ProbeResult::failed(ProbeKind::XssTest, "xss"),
                ProbeResult::passed(ProbeKind::AuthTest, "ok"),
            ],
        );
        vulns.record(
            "http://api.local/b",
            &[ProbeResult::failed(ProbeKind::InjectionTest, "sql")],
        );

        assert_eq!(vulns.total, 3);
        assert_eq!(vulns.by_severity.critical, 2);
        assert_eq!(vulns.by_severity.high, 1);
        assert_eq!(vulns.by_type["InjectionTest"], 2);
        assert_eq!(vulns.by_endpoint["http://api.local/a"], 2);
    }

    #[test]
    fn test_finalize_without_endpoints() {
        let start = Utc::now();
        let mut metrics = ScanMetrics::new("scan_1", "acme", 3, start);
        metrics.finalize(start);
        assert_eq!(metrics.duration_secs, Some(0.0));
        assert_eq!(metrics.performance.throughput, 0.0);
        assert_eq!(metrics.performance.error_rate, 0.0);
    }
}
