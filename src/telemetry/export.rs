//! Metrics export in JSON and Prometheus text format.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::atomic::Ordering;

use chrono::Utc;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use super::aggregator::TelemetryAggregator;
use super::types::ScanMetrics;
use crate::config::METRICS_PREFIX;
use crate::error_handling::{RequestErrorType, TelemetryError};
use strum::IntoEnumIterator;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    Json,
    Prometheus,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    generated_at: chrono::DateTime<Utc>,
    live: &'a [ScanMetrics],
    history: &'a [ScanMetrics],
}

impl TelemetryAggregator {
    /// Renders all telemetry in the named format (`json` or `prometheus`).
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for any other format name.
    pub async fn export_metrics(&self, format: &str) -> Result<String, TelemetryError> {
        let format = ExportFormat::from_str(format)
            .map_err(|_| TelemetryError::UnsupportedFormat(format.to_string()))?;
        match format {
            ExportFormat::Json => self.export_json().await,
            ExportFormat::Prometheus => Ok(self.export_prometheus().await),
        }
    }

    async fn export_json(&self) -> Result<String, TelemetryError> {
        let live_guard = self.live.read().await;
        let mut live: Vec<ScanMetrics> = live_guard.values().cloned().collect();
        let history: Vec<ScanMetrics> = self.history.read().await.iter().cloned().collect();
        drop(live_guard);
        live.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        serde_json::to_string_pretty(&JsonExport {
            generated_at: Utc::now(),
            live: &live,
            history: &history,
        })
        .map_err(|e| TelemetryError::Serialization(e.to_string()))
    }

    async fn export_prometheus(&self) -> String {
        let live_scans = self.live_scans().await;
        let counters = &self.counters;
        let p = METRICS_PREFIX;
        let mut out = String::new();

        let _ = write!(
            out,
            r#"# HELP {p}_live_scans Scans currently running
# TYPE {p}_live_scans gauge
{p}_live_scans {}

# HELP {p}_scans_started_total Scans admitted since startup
# TYPE {p}_scans_started_total counter
{p}_scans_started_total {}

# HELP {p}_scans_finished_total Scans finalized since startup
# TYPE {p}_scans_finished_total counter
{p}_scans_finished_total {}

# HELP {p}_endpoints_tested_total Endpoints whose probe battery completed
# TYPE {p}_endpoints_tested_total counter
{p}_endpoints_tested_total {}

# HELP {p}_vulnerabilities_total Failed probes across all scans
# TYPE {p}_vulnerabilities_total counter
{p}_vulnerabilities_total {}

# HELP {p}_request_errors_total Probe requests that failed, by category
# TYPE {p}_request_errors_total counter
"#,
            live_scans,
            counters.scans_started.load(Ordering::Relaxed),
            counters.scans_finished.load(Ordering::Relaxed),
            counters.endpoints_tested.load(Ordering::Relaxed),
            counters.vulnerabilities.load(Ordering::Relaxed),
        );

        let errors = self.request_errors();
        for error_type in RequestErrorType::iter() {
            let _ = writeln!(
                out,
                "{p}_request_errors_total{{type=\"{}\"}} {}",
                error_type.label(),
                errors.count(error_type)
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{ProbeKind, ProbeResult};
    use std::time::Duration;

    #[tokio::test]
    async fn test_unsupported_format() {
        let telemetry = TelemetryAggregator::new(1);
        assert_eq!(
            telemetry.export_metrics("xml").await,
            Err(TelemetryError::UnsupportedFormat("xml".into()))
        );
    }

    #[tokio::test]
    async fn test_json_export_contains_live_and_history() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_a", "acme", 1).await.unwrap();
        telemetry.start_scan("scan_b", "acme", 1).await.unwrap();
        telemetry.end_scan("scan_b").await.unwrap();

        let json = telemetry.export_metrics("JSON").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["live"][0]["scan_id"], "scan_a");
        assert_eq!(value["history"][0]["scan_id"], "scan_b");
    }

    #[tokio::test]
    async fn test_prometheus_export_counts() {
        let telemetry = TelemetryAggregator::new(1);
        telemetry.start_scan("scan_a", "acme", 2).await.unwrap();
        telemetry
            .record_endpoint_test(
                "scan_a",
                "http://api.local/a",
                Duration::from_millis(10),
                &[ProbeResult::failed(ProbeKind::XssTest, "reflected")],
            )
            .await
            .unwrap();
        telemetry
            .request_errors()
            .increment(RequestErrorType::Timeout);

        let text = telemetry.export_metrics("prometheus").await.unwrap();
        assert!(text.contains("api_sentinel_live_scans 1\n"));
        assert!(text.contains("api_sentinel_endpoints_tested_total 1\n"));
        assert!(text.contains("api_sentinel_vulnerabilities_total 1\n"));
        assert!(text.contains("api_sentinel_request_errors_total{type=\"timeout\"} 1\n"));
        assert!(text.contains("api_sentinel_request_errors_total{type=\"connect\"} 0\n"));
    }
}
