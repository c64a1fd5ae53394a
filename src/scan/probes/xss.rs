//! Reflected XSS probe.

use rand::Rng;

use super::injection::with_rewritten_params;
use super::{ProbeOutcome, Verdict};
use crate::scan::context::ProbeContext;
use crate::scan::types::Endpoint;

/// Script payload carrying a per-run marker, so reflections of unrelated content
/// never match.
fn marker_payload() -> String {
    let marker: u32 = rand::rng().random();
    format!("<script>alert('as{:08x}')</script>", marker)
}

/// Injects a script tag into the query and fails when it comes back unescaped in a
/// response the browser would render as markup.
pub(super) async fn check_reflected_xss(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let payload = marker_payload();

    for url in with_rewritten_params(ctx.url(), |k, _| (k.to_string(), payload.clone())) {
        let mut request = ctx.base_request(endpoint);
        request.url = url;
        let response = ctx.send(request).await?;
        if !response.body.contains(&payload) {
            continue;
        }

        let content_type = response.header("content-type").unwrap_or("").to_ascii_lowercase();
        if content_type.contains("json") {
            log::debug!(
                "Script payload reflected in JSON from {}; not rendered as markup",
                ctx.url()
            );
            continue;
        }
        return Ok(Verdict::Fail(format!(
            "Script payload reflected unescaped (content-type: {})",
            if content_type.is_empty() { "none" } else { &content_type }
        )));
    }
    Ok(Verdict::Pass("Script payload not reflected".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_payloads_are_unique() {
        let a = marker_payload();
        let b = marker_payload();
        assert!(a.starts_with("<script>alert('as"));
        assert_ne!(a, b);
    }
}
