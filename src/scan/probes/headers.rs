//! Security header hygiene probe.

use super::{ProbeOutcome, Verdict};
use crate::config::{
    DISCLOSURE_HEADERS, HEADER_CONTENT_SECURITY_POLICY, HEADER_STRICT_TRANSPORT_SECURITY,
    HEADER_X_CONTENT_TYPE_OPTIONS, HEADER_X_FRAME_OPTIONS, REQUIRED_SECURITY_HEADERS,
};
use crate::scan::context::{ProbeContext, ProbeResponse};
use crate::scan::types::Endpoint;

/// Names of required security headers the response lacks.
///
/// `X-Frame-Options` is satisfied by a CSP `frame-ancestors` directive; HSTS is
/// required on https only.
fn missing_headers(response: &ProbeResponse, is_https: bool) -> Vec<&'static str> {
    let frame_ancestors = response
        .header(HEADER_CONTENT_SECURITY_POLICY)
        .map(|csp| csp.to_ascii_lowercase().contains("frame-ancestors"))
        .unwrap_or(false);

    let mut missing: Vec<&'static str> = REQUIRED_SECURITY_HEADERS
        .iter()
        .copied()
        .filter(|name| match *name {
            HEADER_X_FRAME_OPTIONS => !frame_ancestors && response.header(name).is_none(),
            HEADER_X_CONTENT_TYPE_OPTIONS => !response
                .header(name)
                .map(|v| v.trim().eq_ignore_ascii_case("nosniff"))
                .unwrap_or(false),
            _ => response.header(name).is_none(),
        })
        .collect();

    if is_https && response.header(HEADER_STRICT_TRANSPORT_SECURITY).is_none() {
        missing.push(HEADER_STRICT_TRANSPORT_SECURITY);
    }
    missing
}

fn disclosed_headers(response: &ProbeResponse) -> Vec<String> {
    DISCLOSURE_HEADERS
        .iter()
        .filter_map(|name| response.header(name).map(|v| format!("{}: {}", name, v)))
        .collect()
}

pub(super) async fn check_security_headers(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let response = ctx.send(ctx.base_request(endpoint)).await?;
    let missing = missing_headers(&response, ctx.url().scheme() == "https");
    let disclosed = disclosed_headers(&response);

    let mut message = if missing.is_empty() {
        "Required security headers present".to_string()
    } else {
        format!("Missing security headers: {}", missing.join(", "))
    };
    if !disclosed.is_empty() {
        message.push_str(&format!("; discloses {}", disclosed.join(", ")));
    }

    if missing.is_empty() {
        Ok(Verdict::Pass(message))
    } else {
        Ok(Verdict::Fail(message))
    }
}
