//! Rate-governed HTTP access for probes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use url::Url;

use super::types::Endpoint;
use crate::config::{HEADER_AUTHORIZATION, HEADER_COOKIE, MAX_RESPONSE_BODY_SIZE};
use crate::error_handling::{update_error_stats, RequestErrorStats, RequestErrorType};
use crate::rate_governor::{RateGovernor, TokenBucket};
use crate::tenant::RequestMeter;

/// A probe request that could not be completed.
#[derive(Debug, Clone)]
pub(crate) struct RequestFailure {
    pub error_type: RequestErrorType,
    pub detail: String,
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.detail)
    }
}

/// Byte counter shared by every probe of one scan.
#[derive(Debug, Default)]
pub(crate) struct ScanCounters {
    pub network_bytes: AtomicU64,
}

/// Running mean of successful request latencies, in microseconds.
#[derive(Debug, Default)]
pub(crate) struct LatencyStats {
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl LatencyStats {
    pub fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Zero when no request succeeded.
    pub fn average(&self) -> Duration {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed) / count)
    }
}

/// A request a probe wants sent. Starts as the endpoint's own request.
#[derive(Debug, Clone)]
pub(crate) struct ProbeRequest {
    pub method: Method,
    pub url: Url,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl ProbeRequest {
    fn from_endpoint(endpoint: &Endpoint, url: Url) -> Self {
        let headers = endpoint
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        ProbeRequest {
            method: endpoint.method.into(),
            url,
            headers,
            body: endpoint.body.clone(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets a header, replacing any header of the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Strips `Authorization` and `Cookie`.
    pub fn without_credentials(mut self) -> Self {
        self.headers.retain(|(n, _)| {
            !n.eq_ignore_ascii_case(HEADER_AUTHORIZATION) && !n.eq_ignore_ascii_case(HEADER_COOKIE)
        });
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    pub fn body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Response as seen by a probe. The body is capped at `MAX_RESPONSE_BODY_SIZE`.
#[derive(Debug, Clone)]
pub(crate) struct ProbeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_denied(&self) -> bool {
        matches!(
            self.status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        )
    }
}

/// Everything a probe needs to talk to one endpoint.
///
/// Every request goes through the tenant's rate bucket (if any) and then the
/// global governor; the governor slot is held for the duration of the exchange only.
/// Each request that gets a slot is charged to the tenant through the scan's meter.
pub(crate) struct ProbeContext {
    client: Arc<reqwest::Client>,
    governor: Arc<RateGovernor>,
    tenant_bucket: Option<Arc<TokenBucket>>,
    meter: Arc<RequestMeter>,
    error_stats: Arc<RequestErrorStats>,
    counters: Arc<ScanCounters>,
    latency: LatencyStats,
    url: Url,
}

impl ProbeContext {
    pub fn new(
        client: Arc<reqwest::Client>,
        governor: Arc<RateGovernor>,
        tenant_bucket: Option<Arc<TokenBucket>>,
        meter: Arc<RequestMeter>,
        error_stats: Arc<RequestErrorStats>,
        counters: Arc<ScanCounters>,
        url: Url,
    ) -> Self {
        ProbeContext {
            client,
            governor,
            tenant_bucket,
            meter,
            error_stats,
            counters,
            latency: LatencyStats::default(),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The endpoint's request as submitted.
    pub fn base_request(&self, endpoint: &Endpoint) -> ProbeRequest {
        ProbeRequest::from_endpoint(endpoint, self.url.clone())
    }

    /// Mean latency of this endpoint's successful requests so far.
    pub fn average_latency(&self) -> Duration {
        self.latency.average()
    }

    /// Sends a request under the governor.
    ///
    /// Transport failures are categorized, counted, and returned; no retries.
    pub async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, RequestFailure> {
        if let Some(bucket) = &self.tenant_bucket {
            bucket.take().await;
        }
        let permit = self.governor.acquire().await;
        self.meter.record_request();
        let started = Instant::now();
        let outcome = self.execute(request).await;
        permit.release();

        match outcome {
            Ok(response) => {
                self.latency.record(started.elapsed());
                Ok(response)
            }
            Err(e) => {
                let error_type = update_error_stats(&self.error_stats, &e);
                log::debug!("Probe request to {} failed: {}", self.url, e);
                Err(RequestFailure {
                    error_type,
                    detail: e.to_string(),
                })
            }
        }
    }

    async fn execute(&self, request: ProbeRequest) -> Result<ProbeResponse, reqwest::Error> {
        let ProbeRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut builder = self.client.request(method, url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            self.counters
                .network_bytes
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            let remaining = MAX_RESPONSE_BODY_SIZE - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(ProbeResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::types::HttpMethod;

    #[test]
    fn test_latency_average() {
        let stats = LatencyStats::default();
        assert_eq!(stats.average(), Duration::ZERO);
        stats.record(Duration::from_millis(100));
        stats.record(Duration::from_millis(300));
        assert_eq!(stats.average(), Duration::from_millis(200));
    }

    #[test]
    fn test_request_strips_credentials_and_replaces_headers() {
        let endpoint = Endpoint::new("http://api.local/items?page=1", HttpMethod::Post)
            .with_header("authorization", "Bearer secret")
            .with_header("Cookie", "sid=1")
            .with_header("Accept", "text/plain")
            .with_body("{}");
        let url = Url::parse(&endpoint.url).unwrap();
        let request = ProbeRequest::from_endpoint(&endpoint, url)
            .without_credentials()
            .header("ACCEPT", "application/json")
            .query("q", "a b");

        assert_eq!(request.method, Method::POST);
        assert!(request.has_body());
        assert_eq!(
            request.headers,
            vec![("ACCEPT".to_string(), "application/json".to_string())]
        );
        assert_eq!(request.url.as_str(), "http://api.local/items?page=1&q=a+b");
    }
}
