//! Authentication enforcement and bypass probes.

use super::{ProbeOutcome, Verdict};
use crate::config::BYPASS_HEADERS;
use crate::scan::context::ProbeContext;
use crate::scan::types::Endpoint;

/// Sends the endpoint's request without credentials.
///
/// Fails when the endpoint serves a 2xx anyway.
pub(super) async fn check_authentication(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let response = ctx
        .send(ctx.base_request(endpoint).without_credentials())
        .await?;

    if response.is_success() {
        return Ok(Verdict::Fail(format!(
            "Endpoint returned {} without credentials",
            response.status
        )));
    }
    Ok(Verdict::Pass(format!(
        "Unauthenticated request rejected with {}",
        response.status
    )))
}

/// Retries an unauthenticated request with origin-spoofing headers.
///
/// Only meaningful when the endpoint denies anonymous access; fails if any spoofed
/// header turns the denial into a 2xx.
pub(super) async fn check_auth_bypass(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let anonymous = ctx.base_request(endpoint).without_credentials();
    let baseline = ctx.send(anonymous.clone()).await?;
    if !baseline.is_denied() {
        return Ok(Verdict::Pass(format!(
            "Anonymous request returned {}; no access control to bypass",
            baseline.status
        )));
    }

    for (name, value) in BYPASS_HEADERS {
        let response = ctx.send(anonymous.clone().header(name, value)).await?;
        if response.is_success() {
            return Ok(Verdict::Fail(format!(
                "{}: {} bypassed authentication ({} -> {})",
                name, value, baseline.status, response.status
            )));
        }
    }
    Ok(Verdict::Pass(format!(
        "Access control held against {} spoofed headers",
        BYPASS_HEADERS.len()
    )))
}
