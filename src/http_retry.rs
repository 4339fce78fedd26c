//! HTTP GET with bounded retry and backoff.
//!
//! Used by [`ReqwestTransport`](crate::transport::ReqwestTransport). The
//! prefetch cache never retries on its own; any retrying happens here and
//! only when configured with more than one attempt.

use crate::error::{PrefetchError, Result};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Configuration for [`fetch_bytes_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts (0 is treated as 1).
    pub max_attempts: u32,
    /// Sleep duration between consecutive attempts.
    pub backoff: Duration,
    /// Per-attempt timeout. When `None`, the client's own timeout applies.
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(crate::config::DEFAULT_RETRY_BACKOFF_MS),
            timeout: None,
        }
    }
}

/// GET `url` and collect the full body.
///
/// Non-2xx responses become [`PrefetchError::HttpStatus`]. Only retryable
/// errors (network failures, 5xx, 408, 429) consume further attempts.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-retryable one.
pub async fn fetch_bytes_with_retry(client: &Client, url: &Url, config: &RetryConfig) -> Result<Bytes> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match fetch_once(client, url, config.timeout).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                warn!(
                    "Prefetch GET failed for {} (attempt {}/{}): {}, retrying in {}ms",
                    url,
                    attempt,
                    max_attempts,
                    e,
                    config.backoff.as_millis()
                );
                tokio::time::sleep(config.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(client: &Client, url: &Url, timeout: Option<Duration>) -> Result<Bytes> {
    let mut request = client.get(url.clone());
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PrefetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    Ok(response.bytes().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff: Duration::from_millis(1),
            timeout: None,
        }
    }

    fn url_for(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn retry_config_defaults_to_single_attempt() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 1);
        assert_eq!(cfg.backoff, Duration::from_millis(500));
        assert!(cfg.timeout.is_none());
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = fetch_bytes_with_retry(&Client::new(), &url_for(&server, "/a.m3u8"), &fast(1))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"#EXTM3U");
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;

        // 200 fallback (lower priority, mounted first)
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        // 500 on first hit (higher priority, mounted last, deactivates after 1)
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let bytes = fetch_bytes_with_retry(&Client::new(), &url_for(&server, "/x.ts"), &fast(2))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"recovered");
    }

    #[tokio::test]
    async fn single_attempt_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_bytes_with_retry(&Client::new(), &url_for(&server, "/x.ts"), &fast(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PrefetchError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_bytes_with_retry(&Client::new(), &url_for(&server, "/gone.m3u8"), &fast(3))
            .await
            .unwrap_err();
        assert!(matches!(err, PrefetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let result = fetch_bytes_with_retry(&Client::new(), &url_for(&server, "/x.ts"), &fast(3)).await;
        assert!(result.is_err());
    }
}
