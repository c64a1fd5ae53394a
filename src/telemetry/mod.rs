//! Telemetry aggregation.
//!
//! This module records what every scan did and serves it back:
//! - Per-scan live records (timing, vulnerability tallies, resource usage)
//! - A bounded history of finalized scans (`retention_days × 24` records)
//! - Tenant and system aggregates over a time window
//! - JSON and Prometheus export

mod aggregator;
mod export;
mod types;

pub use aggregator::{history_capacity, TelemetryAggregator};
pub use export::ExportFormat;
pub use types::{
    EndpointVulnerabilities, PerformanceMetrics, ResourceMetrics, ScanMetrics, SystemMetrics,
    TenantMetrics, VulnerabilityMetrics,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::TelemetryError;
    use crate::resources::ResourceSample;
    use crate::scan::{ProbeKind, ProbeResult};
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn failed(probe: ProbeKind) -> ProbeResult {
        ProbeResult::failed(probe, "vulnerable")
    }

    #[test]
    fn test_history_capacity() {
        assert_eq!(history_capacity(7), 168);
        assert_eq!(history_capacity(1), 24);
        assert_eq!(history_capacity(0), 24);
    }

    #[tokio::test]
    async fn test_scan_timing_aggregates() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_c", "acme", 5).await.unwrap();
        let start = telemetry.scan_metrics("scan_c").await.unwrap().start_time;

        for ms in [100, 200, 150, 300, 250] {
            telemetry
                .record_endpoint_test("scan_c", "http://api.local/x", Duration::from_millis(ms), &[])
                .await
                .unwrap();
        }
        let metrics = telemetry
            .end_scan_at("scan_c", start + chrono::Duration::seconds(2))
            .await
            .unwrap();

        assert_eq!(metrics.endpoints_tested, 5);
        assert_eq!(metrics.performance.avg_response_time_ms, 200.0);
        assert_eq!(metrics.performance.min_response_time_ms, 100.0);
        assert_eq!(metrics.performance.max_response_time_ms, 300.0);
        assert_eq!(metrics.performance.throughput, 2.5);
        assert_eq!(metrics.duration_secs, Some(2.0));
        assert_eq!(metrics.performance.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_endpoints_tested_never_exceeds_total() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_1", "acme", 1).await.unwrap();
        for _ in 0..3 {
            telemetry
                .record_endpoint_test(
                    "scan_1",
                    "http://api.local/a",
                    Duration::from_millis(5),
                    &[failed(ProbeKind::AuthTest)],
                )
                .await
                .unwrap();
        }
        let metrics = telemetry.scan_metrics("scan_1").await.unwrap();
        assert_eq!(metrics.endpoints_tested, 1);
        assert_eq!(metrics.vulnerabilities.total, 1);
    }

    #[tokio::test]
    async fn test_history_evicts_oldest() {
        let telemetry = TelemetryAggregator::new(1);
        for i in 0..25 {
            let id = format!("scan_{}", i);
            telemetry.start_scan(&id, "acme", 1).await.unwrap();
            telemetry.end_scan(&id).await.unwrap();
        }

        assert_eq!(telemetry.history.read().await.len(), 24);
        assert_eq!(
            telemetry.scan_metrics("scan_0").await,
            Err(TelemetryError::NotFound("scan_0".into()))
        );
        assert!(telemetry.scan_metrics("scan_1").await.is_ok());
        assert!(telemetry.scan_metrics("scan_24").await.is_ok());
    }

    #[tokio::test]
    async fn test_late_writes_are_rejected() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_1", "acme", 2).await.unwrap();
        telemetry.end_scan("scan_1").await.unwrap();

        let result = telemetry
            .record_endpoint_test("scan_1", "http://api.local/a", Duration::ZERO, &[])
            .await;
        assert_eq!(result, Err(TelemetryError::ScanNotLive("scan_1".into())));
        assert_eq!(
            telemetry
                .record_resource_usage("scan_1", ResourceSample::default())
                .await,
            Err(TelemetryError::ScanNotLive("scan_1".into()))
        );
        assert!(telemetry.end_scan("scan_1").await.is_err());
        assert_eq!(
            telemetry.scan_metrics("scan_1").await.unwrap().endpoints_tested,
            0
        );
        assert_eq!(
            telemetry.start_scan("scan_2", "acme", 1).await,
            Ok(())
        );
        assert_eq!(
            telemetry.start_scan("scan_2", "acme", 1).await,
            Err(TelemetryError::AlreadyTracked("scan_2".into()))
        );
    }

    #[tokio::test]
    async fn test_resource_usage_overwrites_latest_sample() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_1", "acme", 1).await.unwrap();
        for tasks in [3, 1] {
            telemetry
                .record_resource_usage(
                    "scan_1",
                    ResourceSample {
                        cpu_percent: 12.5,
                        memory_mb: 64.0,
                        concurrent_tasks: tasks,
                        network_bytes: 2048,
                        disk_bytes: 0,
                    },
                )
                .await
                .unwrap();
        }
        let resources = telemetry.scan_metrics("scan_1").await.unwrap().resources;
        assert_eq!(resources.concurrent_tasks, 1);
        assert_eq!(resources.network_bytes, 2048);
        assert!(resources.sampled_at.is_some());
    }

    #[tokio::test]
    async fn test_tenant_metrics_and_top_endpoints() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_1", "acme", 2).await.unwrap();
        telemetry
            .record_endpoint_test(
                "scan_1",
                "http://api.local/users",
                Duration::from_millis(100),
                &[failed(ProbeKind::InjectionTest), failed(ProbeKind::XssTest)],
            )
            .await
            .unwrap();
        telemetry
            .record_endpoint_test(
                "scan_1",
                "http://api.local/health",
                Duration::from_millis(300),
                &[failed(ProbeKind::HeaderSecurityTest)],
            )
            .await
            .unwrap();
        telemetry.end_scan("scan_1").await.unwrap();

        telemetry.start_scan("scan_2", "other", 1).await.unwrap();
        telemetry
            .record_endpoint_test(
                "scan_2",
                "http://other.local/",
                Duration::from_millis(50),
                &[failed(ProbeKind::AuthTest)],
            )
            .await
            .unwrap();
        telemetry.end_scan("scan_2").await.unwrap();

        let acme = telemetry.tenant_metrics("acme", DAY).await;
        assert_eq!(acme.total_scans, 1);
        assert_eq!(acme.endpoints_tested, 2);
        assert_eq!(acme.total_vulnerabilities, 3);
        assert_eq!(acme.vulnerabilities.critical, 1);
        assert_eq!(acme.vulnerabilities.high, 1);
        assert_eq!(acme.vulnerabilities.low, 1);
        assert_eq!(acme.avg_response_time_ms, 200.0);
        assert_eq!(
            acme.top_vulnerable_endpoints,
            vec![
                EndpointVulnerabilities {
                    url: "http://api.local/users".into(),
                    vulnerabilities: 2
                },
                EndpointVulnerabilities {
                    url: "http://api.local/health".into(),
                    vulnerabilities: 1
                },
            ]
        );

        let system = telemetry.system_metrics(DAY).await;
        assert_eq!(system.total_scans, 2);
        assert_eq!(system.active_tenants, 2);
        assert_eq!(system.live_scans, 0);
        assert_eq!(system.total_vulnerabilities, 4);
        assert_eq!(system.vulnerabilities_by_type["AuthTest"], 1);
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_1", "acme", 1).await.unwrap();
        telemetry
            .record_endpoint_test(
                "scan_1",
                "http://api.local/a",
                Duration::from_millis(40),
                &[failed(ProbeKind::NoSqlInjectionTest)],
            )
            .await
            .unwrap();
        telemetry.end_scan("scan_1").await.unwrap();

        let first = (
            telemetry.scan_metrics("scan_1").await.unwrap(),
            telemetry.tenant_metrics("acme", DAY).await,
            telemetry.system_metrics(DAY).await,
        );
        let second = (
            telemetry.scan_metrics("scan_1").await.unwrap(),
            telemetry.tenant_metrics("acme", DAY).await,
            telemetry.system_metrics(DAY).await,
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_window_excludes_old_scans() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_old", "acme", 1).await.unwrap();
        telemetry.end_scan("scan_old").await.unwrap();
        {
            let mut history = telemetry.history.write().await;
            history[0].start_time = history[0].start_time - chrono::Duration::hours(3);
        }
        telemetry.start_scan("scan_new", "acme", 1).await.unwrap();
        telemetry.end_scan("scan_new").await.unwrap();

        let recent = telemetry
            .tenant_metrics("acme", Duration::from_secs(60 * 60))
            .await;
        assert_eq!(recent.total_scans, 1);
        assert_eq!(telemetry.tenant_metrics("acme", DAY).await.total_scans, 2);
    }
}
