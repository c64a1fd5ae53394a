//! Request error categorization.

use super::stats::RequestErrorStats;
use super::types::RequestErrorType;

/// Categorizes a `reqwest::Error` into a `RequestErrorType`.
///
/// Status errors never reach here: probes read every response, whatever its status,
/// and judge the status themselves.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> RequestErrorType {
    if error.is_timeout() {
        RequestErrorType::Timeout
    } else if error.is_connect() {
        RequestErrorType::Connect
    } else if error.is_redirect() {
        RequestErrorType::Redirect
    } else if error.is_builder() {
        RequestErrorType::Builder
    } else if error.is_body() {
        RequestErrorType::Body
    } else if error.is_decode() {
        RequestErrorType::Decode
    } else if error.is_request() {
        RequestErrorType::Request
    } else {
        RequestErrorType::Other
    }
}

/// Records a failed request and returns its category.
pub fn update_error_stats(stats: &RequestErrorStats, error: &reqwest::Error) -> RequestErrorType {
    let error_type = categorize_reqwest_error(error);
    stats.increment(error_type);
    error_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        // Port 9 (discard) on loopback is closed in test environments
        let err = client
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .expect_err("closed port should refuse the connection");
        let stats = RequestErrorStats::new();
        let category = update_error_stats(&stats, &err);
        assert!(matches!(
            category,
            RequestErrorType::Connect | RequestErrorType::Request
        ));
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_builder_error_category() {
        let client = reqwest::Client::new();
        let err = client
            .get("not a url")
            .build()
            .expect_err("invalid URL should fail to build");
        assert_eq!(categorize_reqwest_error(&err), RequestErrorType::Builder);
    }
}
