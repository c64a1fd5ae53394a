//! Scan data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::probes::{ProbeResult, Severity};
use super::scoring::RiskLevel;

/// HTTP method of an endpoint under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// An API endpoint submitted for assessment.
///
/// `headers` are sent with every probe request unless the probe deliberately strips
/// them (the auth probes remove credentials).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Endpoint {
            url: url.into(),
            method,
            body: None,
            headers: None,
        }
    }

    /// Shorthand for a `GET` endpoint.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Get)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Probe battery outcome for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResult {
    pub url: String,
    /// 0..=100, higher is more secure
    pub score: u8,
    /// One entry per probe, in battery order
    pub results: Vec<ProbeResult>,
}

impl EndpointResult {
    pub fn failed_probes(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Lifecycle state of a scan.
///
/// Transitions only move forward:
/// `Pending → Running → {Completed, Failed, Stopped}` plus `Pending → Failed` for
/// scans that have nothing to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Stopped
        )
    }

    /// `Pending → Failed` is the path of a scan with no endpoint that can be probed:
    /// no probe was ever dispatched, so it never counts as `Running`.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

/// One assessment request and its accumulating results.
///
/// Owned exclusively by the orchestrator; callers see [`ScanStatusSnapshot`]s and the
/// final [`ScanReport`].
#[derive(Debug, Clone)]
pub(crate) struct ScanJob {
    pub scan_id: String,
    pub tenant_id: String,
    pub endpoints: Vec<Endpoint>,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<EndpointResult>,
}

impl ScanJob {
    pub fn new(scan_id: String, tenant_id: String, endpoints: Vec<Endpoint>) -> Self {
        ScanJob {
            scan_id,
            tenant_id,
            endpoints,
            status: ScanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: Vec::new(),
        }
    }

    /// Moves the job to `next`, stamping start and completion times.
    ///
    /// Returns `false` and leaves the job untouched for backward or repeated
    /// transitions.
    pub fn transition(&mut self, next: ScanStatus) -> bool {
        if !self.status.can_transition_to(next) {
            log::warn!(
                "Ignoring invalid transition of scan {} from {} to {}",
                self.scan_id,
                self.status,
                next
            );
            return false;
        }
        let now = Utc::now();
        if next == ScanStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        true
    }

    pub fn snapshot(&self) -> ScanStatusSnapshot {
        ScanStatusSnapshot {
            scan_id: self.scan_id.clone(),
            tenant_id: self.tenant_id.clone(),
            status: self.status,
            total_endpoints: self.endpoints.len(),
            endpoints_completed: self.results.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            results: self.results.clone(),
        }
    }
}

/// Read-only progress view of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatusSnapshot {
    pub scan_id: String,
    pub tenant_id: String,
    pub status: ScanStatus,
    pub total_endpoints: usize,
    pub endpoints_completed: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Endpoint results recorded so far, in completion order
    pub results: Vec<EndpointResult>,
}

/// Failed-probe counts by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn merge(&mut self, other: &SeverityCounts) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Final outcome of a scan, handed to downstream collaborators once terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub tenant_id: String,
    pub status: ScanStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_endpoints: usize,
    /// One entry per endpoint that was dispatched
    pub results: Vec<EndpointResult>,
    /// Mean endpoint score; `None` when no endpoint was probed
    pub average_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub vulnerabilities: SeverityCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_transitions_only_move_forward() {
        use ScanStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Stopped));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed, Stopped] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Stopped] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_job_transition_stamps_times() {
        let mut job = ScanJob::new("scan_1".into(), "acme".into(), vec![]);
        assert!(job.started_at.is_none());
        assert!(job.transition(ScanStatus::Running));
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());
        assert!(job.transition(ScanStatus::Completed));
        assert!(job.completed_at.is_some());

        assert!(!job.transition(ScanStatus::Running));
        assert_eq!(job.status, ScanStatus::Completed);
    }

    #[test]
    fn test_endpoint_builder_and_method_parsing() {
        let endpoint = Endpoint::new("https://api.example.com/orders", HttpMethod::Post)
            .with_body(r#"{"id":1}"#)
            .with_header("Authorization", "Bearer t");
        assert_eq!(endpoint.body.as_deref(), Some(r#"{"id":1}"#));
        assert_eq!(endpoint.headers.unwrap()["Authorization"], "Bearer t");

        assert_eq!(HttpMethod::from_str("patch").unwrap(), HttpMethod::Patch);
        assert_eq!(reqwest::Method::from(HttpMethod::Delete), reqwest::Method::DELETE);

        let parsed: Endpoint =
            serde_json::from_str(r#"{"url":"http://x/","method":"GET"}"#).unwrap();
        assert_eq!(parsed, Endpoint::get("http://x/"));
    }
}
