//! HTTP method hygiene probe.

use reqwest::Method;

use super::{ProbeOutcome, Verdict};
use crate::scan::context::ProbeContext;
use crate::scan::types::{Endpoint, HttpMethod};

/// Fails when the endpoint answers `TRACE` or an undeclared state-changing method
/// with a 2xx.
pub(super) async fn check_methods(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let unexpected = if endpoint.method == HttpMethod::Delete {
        Method::PUT
    } else {
        Method::DELETE
    };

    let mut accepted = Vec::new();
    for method in [Method::TRACE, unexpected] {
        let request = ctx
            .base_request(endpoint)
            .method(method.clone())
            .body(None);
        let response = ctx.send(request).await?;
        if response.is_success() {
            accepted.push(format!("{} ({})", method, response.status));
        }
    }

    if accepted.is_empty() {
        Ok(Verdict::Pass("Unexpected methods are rejected".to_string()))
    } else {
        Ok(Verdict::Fail(format!(
            "Endpoint accepts unexpected methods: {}",
            accepted.join(", ")
        )))
    }
}
