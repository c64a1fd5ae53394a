//! The fixed probe battery.
//!
//! Each probe issues one or more rate-governed requests against an endpoint and
//! reports a single pass/fail result. Probes hold no state between runs; a failed
//! request is reported as a failed probe, never as an error.

mod auth;
mod headers;
mod injection;
mod methods;
mod tampering;
mod xss;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::context::{ProbeContext, RequestFailure};
use super::types::Endpoint;
use crate::config::MAX_PROBE_MESSAGE_LENGTH;

/// Severity of the vulnerability a failed probe indicates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// One of the eight security probes, in battery order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
pub enum ProbeKind {
    AuthTest,
    #[serde(rename = "HTTPMethodTest")]
    #[strum(serialize = "HTTPMethodTest")]
    HttpMethodTest,
    InjectionTest,
    #[serde(rename = "NoSQLInjectionTest")]
    #[strum(serialize = "NoSQLInjectionTest")]
    NoSqlInjectionTest,
    #[serde(rename = "XSSTest")]
    #[strum(serialize = "XSSTest")]
    XssTest,
    HeaderSecurityTest,
    AuthBypassTest,
    ParameterTamperingTest,
}

impl ProbeKind {
    /// Score deducted from an endpoint when this probe fails.
    pub fn penalty(&self) -> i32 {
        match self {
            ProbeKind::AuthTest => 30,
            ProbeKind::HttpMethodTest => 20,
            ProbeKind::InjectionTest => 50,
            ProbeKind::NoSqlInjectionTest => 50,
            ProbeKind::XssTest => 40,
            ProbeKind::HeaderSecurityTest => 25,
            ProbeKind::AuthBypassTest => 35,
            ProbeKind::ParameterTamperingTest => 30,
        }
    }

    /// Severity of the vulnerability this probe detects.
    pub fn severity(&self) -> Severity {
        match self {
            ProbeKind::InjectionTest | ProbeKind::NoSqlInjectionTest => Severity::Critical,
            ProbeKind::XssTest | ProbeKind::AuthBypassTest => Severity::High,
            ProbeKind::ParameterTamperingTest => Severity::Medium,
            ProbeKind::HeaderSecurityTest | ProbeKind::AuthTest | ProbeKind::HttpMethodTest => {
                Severity::Low
            }
        }
    }

    /// Runs this probe against an endpoint.
    pub(crate) async fn run(self, ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeResult {
        let outcome = match self {
            ProbeKind::AuthTest => auth::check_authentication(ctx, endpoint).await,
            ProbeKind::HttpMethodTest => methods::check_methods(ctx, endpoint).await,
            ProbeKind::InjectionTest => injection::check_sql_injection(ctx, endpoint).await,
            ProbeKind::NoSqlInjectionTest => injection::check_nosql_injection(ctx, endpoint).await,
            ProbeKind::XssTest => xss::check_reflected_xss(ctx, endpoint).await,
            ProbeKind::HeaderSecurityTest => headers::check_security_headers(ctx, endpoint).await,
            ProbeKind::AuthBypassTest => auth::check_auth_bypass(ctx, endpoint).await,
            ProbeKind::ParameterTamperingTest => {
                tampering::check_parameter_tampering(ctx, endpoint).await
            }
        };
        match outcome {
            Ok(verdict) => verdict.into_result(self),
            Err(failure) => ProbeResult::failed(self, failure.to_string()),
        }
    }
}

/// Pass/fail judgement of a probe that completed its requests.
pub(crate) enum Verdict {
    Pass(String),
    Fail(String),
}

impl Verdict {
    fn into_result(self, probe: ProbeKind) -> ProbeResult {
        match self {
            Verdict::Pass(message) => ProbeResult::passed(probe, message),
            Verdict::Fail(message) => ProbeResult::failed(probe, message),
        }
    }
}

pub(crate) type ProbeOutcome = Result<Verdict, RequestFailure>;

/// Outcome of one probe against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe: ProbeKind,
    pub passed: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn passed(probe: ProbeKind, message: impl Into<String>) -> Self {
        Self::new(probe, true, message.into())
    }

    pub fn failed(probe: ProbeKind, message: impl Into<String>) -> Self {
        Self::new(probe, false, message.into())
    }

    fn new(probe: ProbeKind, passed: bool, mut message: String) -> Self {
        if message.len() > MAX_PROBE_MESSAGE_LENGTH {
            let mut cut = MAX_PROBE_MESSAGE_LENGTH;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            message.push_str("...");
        }
        ProbeResult {
            probe,
            passed,
            message,
        }
    }

    /// Probe name as reported to downstream collaborators.
    pub fn name(&self) -> String {
        self.probe.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_battery_has_eight_probes_in_order() {
        let names: Vec<String> = ProbeKind::iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "AuthTest",
                "HTTPMethodTest",
                "InjectionTest",
                "NoSQLInjectionTest",
                "XSSTest",
                "HeaderSecurityTest",
                "AuthBypassTest",
                "ParameterTamperingTest",
            ]
        );
        assert_eq!(
            ProbeKind::iter().count() as u64,
            crate::config::PROBES_PER_ENDPOINT
        );
    }

    #[test]
    fn test_probe_names_parse_back() {
        for probe in ProbeKind::iter() {
            assert_eq!(ProbeKind::from_str(&probe.to_string()).unwrap(), probe);
        }
        assert_eq!(
            serde_json::to_string(&ProbeKind::NoSqlInjectionTest).unwrap(),
            "\"NoSQLInjectionTest\""
        );
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(ProbeKind::InjectionTest.severity(), Severity::Critical);
        assert_eq!(ProbeKind::NoSqlInjectionTest.severity(), Severity::Critical);
        assert_eq!(ProbeKind::XssTest.severity(), Severity::High);
        assert_eq!(ProbeKind::AuthBypassTest.severity(), Severity::High);
        assert_eq!(ProbeKind::ParameterTamperingTest.severity(), Severity::Medium);
        assert_eq!(ProbeKind::HeaderSecurityTest.severity(), Severity::Low);
        assert_eq!(ProbeKind::AuthTest.severity(), Severity::Low);
        assert_eq!(ProbeKind::HttpMethodTest.severity(), Severity::Low);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let result = ProbeResult::failed(ProbeKind::XssTest, "é".repeat(400));
        assert!(result.message.len() <= MAX_PROBE_MESSAGE_LENGTH + 3);
        assert!(result.message.ends_with("..."));
        assert!(!result.passed);
        assert_eq!(result.name(), "XSSTest");
    }
}
