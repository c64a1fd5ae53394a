//! Endpoint scoring and scan risk classification.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::probes::ProbeResult;
use super::types::{EndpointResult, SeverityCounts};
use crate::config::MAX_ENDPOINT_SCORE;

/// Overall risk of a scan, derived from its average endpoint score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// 90–100 low, 70–89 medium, 50–69 high, below 50 critical.
    pub fn from_score(average_score: f64) -> Self {
        if average_score >= 90.0 {
            RiskLevel::Low
        } else if average_score >= 70.0 {
            RiskLevel::Medium
        } else if average_score >= 50.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Starts at 100, subtracts the penalty of every failed probe, clamps to 0..=100.
pub fn score_endpoint(results: &[ProbeResult]) -> u8 {
    let penalties: i32 = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.probe.penalty())
        .sum();
    (MAX_ENDPOINT_SCORE - penalties).clamp(0, MAX_ENDPOINT_SCORE) as u8
}

/// Aggregate judgement over a scan's endpoint results.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub average_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub vulnerabilities: SeverityCounts,
}

pub fn summarize(results: &[EndpointResult]) -> ScanSummary {
    let mut vulnerabilities = SeverityCounts::default();
    for failed in results.iter().flat_map(|r| r.failed_probes()) {
        vulnerabilities.add(failed.probe.severity());
    }

    let average_score = if results.is_empty() {
        None
    } else {
        let total: f64 = results.iter().map(|r| f64::from(r.score)).sum();
        Some(total / results.len() as f64)
    };

    ScanSummary {
        average_score,
        risk_level: average_score.map(RiskLevel::from_score),
        vulnerabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::probes::ProbeKind;
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    fn battery(failed: &[ProbeKind]) -> Vec<ProbeResult> {
        ProbeKind::iter()
            .map(|probe| {
                if failed.contains(&probe) {
                    ProbeResult::failed(probe, "vulnerable")
                } else {
                    ProbeResult::passed(probe, "ok")
                }
            })
            .collect()
    }

    fn endpoint(score: u8) -> EndpointResult {
        EndpointResult {
            url: format!("http://api.local/{}", score),
            score,
            results: vec![],
        }
    }

    #[test]
    fn test_all_probes_passing_scores_100() {
        assert_eq!(score_endpoint(&battery(&[])), 100);
    }

    #[test]
    fn test_auth_and_injection_failures_are_critical() {
        let results = battery(&[ProbeKind::AuthTest, ProbeKind::InjectionTest]);
        let score = score_endpoint(&results);
        assert_eq!(score, 20);

        let summary = summarize(&[EndpointResult {
            url: "http://api.local/users".into(),
            score,
            results,
        }]);
        assert_eq!(summary.average_score, Some(20.0));
        assert_eq!(summary.risk_level, Some(RiskLevel::Critical));
        assert_eq!(summary.vulnerabilities.critical, 1);
        assert_eq!(summary.vulnerabilities.low, 1);
    }

    #[test]
    fn test_average_of_80_and_60_is_medium() {
        let summary = summarize(&[endpoint(80), endpoint(60)]);
        assert_eq!(summary.average_score, Some(70.0));
        assert_eq!(summary.risk_level, Some(RiskLevel::Medium));
    }

    #[test]
    fn test_every_probe_failing_clamps_to_zero() {
        let all: Vec<ProbeKind> = ProbeKind::iter().collect();
        assert_eq!(score_endpoint(&battery(&all)), 0);
    }

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(90.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(89.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69.5), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(49.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Critical);
    }

    #[test]
    fn test_empty_scan_has_no_score() {
        let summary = summarize(&[]);
        assert_eq!(summary.average_score, None);
        assert_eq!(summary.risk_level, None);
        assert_eq!(summary.vulnerabilities.total(), 0);
    }

    proptest! {
        #[test]
        fn prop_score_stays_in_range(mask in prop::collection::vec(any::<bool>(), 8)) {
            let failed: Vec<ProbeKind> = ProbeKind::iter()
                .zip(mask.iter())
                .filter(|(_, failed)| **failed)
                .map(|(probe, _)| probe)
                .collect();
            let expected = (100 - failed.iter().map(|p| p.penalty()).sum::<i32>()).max(0);
            let score = score_endpoint(&battery(&failed));
            prop_assert!(score <= 100);
            prop_assert_eq!(i32::from(score), expected);
        }
    }
}
