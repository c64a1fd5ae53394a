// Shared test helpers for orchestrator setup and mock API servers.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::sync::Arc;
use std::time::Duration;

use api_sentinel::{
    Config, Endpoint, LogLevel, RateGovernorConfig, ResourceLimits, ScanOrchestrator, Tenant,
};
use wiremock::matchers::method;
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Bearer token the mock APIs accept.
#[allow(dead_code)]
pub const TOKEN: &str = "Bearer test-token";

/// Creates a Config suited to tests: fast governor, short timeouts, quiet logs.
#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        rate_governor: RateGovernorConfig {
            requests_per_second: 1000,
            max_concurrent_requests: 10,
        },
        request_timeout_seconds: 2,
        max_concurrent_endpoints: 4,
        resource_sample_interval_secs: 1,
        log_level: LogLevel::Error,
        ..Default::default()
    }
}

/// Creates an orchestrator from `config` with tenant "acme" registered under `limits`.
#[allow(dead_code)]
pub fn orchestrator_with(config: &Config, limits: ResourceLimits) -> Arc<ScanOrchestrator> {
    let orchestrator =
        ScanOrchestrator::from_config(config).expect("Failed to build test orchestrator");
    orchestrator
        .tenants()
        .register(Tenant::new("acme", "Acme Corp", limits));
    Arc::new(orchestrator)
}

/// Creates an orchestrator with test config and default tenant limits.
#[allow(dead_code)]
pub fn orchestrator() -> Arc<ScanOrchestrator> {
    orchestrator_with(&test_config(), ResourceLimits::default())
}

/// Endpoint on a mock server, sent with the accepted credentials.
#[allow(dead_code)]
pub fn authed_endpoint(server: &MockServer, path: &str) -> Endpoint {
    Endpoint::get(format!("{}{}", server.uri(), path)).with_header("Authorization", TOKEN)
}

/// Matches requests lacking a header.
pub struct MissingHeader(pub &'static str);

impl Match for MissingHeader {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key(self.0)
    }
}

/// Matches requests with a single quote in any query value.
pub struct QuoteInQuery;

impl Match for QuoteInQuery {
    fn matches(&self, request: &Request) -> bool {
        request.url.query_pairs().any(|(_, v)| v.contains('\''))
    }
}

/// A response carrying the security headers the header probe requires.
pub fn hardened(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("X-Content-Type-Options", "nosniff")
        .insert_header("X-Frame-Options", "DENY")
        .insert_header("Content-Type", "application/json")
}

/// Rejects TRACE and DELETE with 405.
async fn mount_method_guard(server: &MockServer) {
    for verb in ["TRACE", "DELETE", "PUT"] {
        Mock::given(method(verb))
            .respond_with(hardened(405))
            .with_priority(1)
            .mount(server)
            .await;
    }
}

/// Mounts an API every probe passes against: credentials enforced, unexpected
/// methods rejected, security headers set, input never reflected.
#[allow(dead_code)]
pub async fn mount_secure_api(server: &MockServer) {
    mount_method_guard(server).await;
    Mock::given(MissingHeader("authorization"))
        .respond_with(hardened(401).set_body_string(r#"{"error":"unauthorized"}"#))
        .with_priority(2)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(hardened(200).set_body_string(r#"{"items":[]}"#))
        .with_priority(3)
        .mount(server)
        .await;
}

/// Mounts an API that serves data without credentials and leaks SQL errors for quote
/// payloads. Every other probe passes against it.
#[allow(dead_code)]
pub async fn mount_leaky_api(server: &MockServer) {
    mount_method_guard(server).await;
    Mock::given(QuoteInQuery)
        .respond_with(
            hardened(500).set_body_string(
                "You have an error in your SQL syntax; check the manual near ''' at line 1",
            ),
        )
        .with_priority(2)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(hardened(200).set_body_string(r#"{"items":[]}"#))
        .with_priority(3)
        .mount(server)
        .await;
}

/// Mounts a secure API whose responses take `delay` to arrive.
#[allow(dead_code)]
pub async fn mount_slow_api(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .respond_with(hardened(200).set_delay(delay))
        .mount(server)
        .await;
}
