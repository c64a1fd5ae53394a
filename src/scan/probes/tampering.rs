//! Parameter tampering probe.

use reqwest::StatusCode;

use super::{ProbeOutcome, Verdict};
use crate::scan::context::ProbeContext;
use crate::scan::types::Endpoint;

/// Privilege and business-logic parameters appended to the query.
const TAMPERED_PARAMS: &[(&str, &str)] = &[
    ("admin", "true"),
    ("role", "admin"),
    ("debug", "true"),
    ("price", "-1"),
];

/// Compares the endpoint's normal response with one carrying tampered parameters.
///
/// Fails when tampering turns a refusal into a 2xx, or provokes a server error the
/// untouched request does not.
pub(super) async fn check_parameter_tampering(
    ctx: &ProbeContext,
    endpoint: &Endpoint,
) -> ProbeOutcome {
    let baseline = ctx.send(ctx.base_request(endpoint)).await?;

    let tampered = TAMPERED_PARAMS
        .iter()
        .fold(ctx.base_request(endpoint), |request, (key, value)| {
            request.query(key, value)
        });
    let response = ctx.send(tampered).await?;

    Ok(judge(baseline.status, response.status))
}

fn judge(baseline: StatusCode, tampered: StatusCode) -> Verdict {
    if !baseline.is_success() && tampered.is_success() {
        return Verdict::Fail(format!(
            "Tampered parameters changed {} into {}",
            baseline, tampered
        ));
    }
    if !baseline.is_server_error() && tampered.is_server_error() {
        return Verdict::Fail(format!(
            "Tampered parameters caused a server error ({})",
            tampered
        ));
    }
    Verdict::Pass(format!(
        "Tampered parameters handled consistently ({} -> {})",
        baseline, tampered
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(verdict: Verdict) -> bool {
        matches!(verdict, Verdict::Fail(_))
    }

    #[test]
    fn test_judge() {
        assert!(failed(judge(StatusCode::FORBIDDEN, StatusCode::OK)));
        assert!(failed(judge(StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(!failed(judge(StatusCode::OK, StatusCode::OK)));
        assert!(!failed(judge(StatusCode::FORBIDDEN, StatusCode::BAD_REQUEST)));
        assert!(!failed(judge(
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::SERVICE_UNAVAILABLE
        )));
    }
}
