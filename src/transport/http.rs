use super::{FetchPriority, Transport};
use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::http_retry::{RetryConfig, fetch_bytes_with_retry};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

/// [`Transport`] over a pooled `reqwest` client.
///
/// Low-priority requests share a fixed number of permits so background
/// prefetching cannot crowd out the priority item; high-priority requests
/// skip the queue.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    retry: RetryConfig,
    background: Arc<Semaphore>,
}

impl ReqwestTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: &PrefetchConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Build a transport around an existing client.
    pub fn with_client(client: Client, config: &PrefetchConfig) -> Self {
        Self {
            client,
            retry: RetryConfig {
                max_attempts: config.max_attempts,
                backoff: config.retry_backoff,
                timeout: None,
            },
            background: Arc::new(Semaphore::new(config.background_concurrency.max(1))),
        }
    }

    /// Background permits currently free.
    pub fn available_background_permits(&self) -> usize {
        self.background.available_permits()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, priority: FetchPriority) -> Result<Bytes> {
        let _permit = match priority {
            FetchPriority::High => None,
            FetchPriority::Low => Some(
                self.background
                    .acquire()
                    .await
                    .map_err(|_| PrefetchError::Cancelled)?,
            ),
        };

        debug!("GET {} ({} priority)", url, priority.as_str());
        fetch_bytes_with_retry(&self.client, url, &self.retry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn zero_background_concurrency_still_admits_one() {
        let config = PrefetchConfig {
            background_concurrency: 0,
            ..Default::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        assert_eq!(transport.available_background_permits(), 1);
    }

    #[tokio::test]
    async fn low_priority_permit_released_after_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bg.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
            .mount(&server)
            .await;

        let config = PrefetchConfig {
            background_concurrency: 2,
            ..Default::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        let url = Url::parse(&format!("{}/bg.m3u8", server.uri())).unwrap();

        let body = transport.get(&url, FetchPriority::Low).await.unwrap();
        assert_eq!(&body[..], b"#EXTM3U");
        assert_eq!(transport.available_background_permits(), 2);
    }

    #[tokio::test]
    async fn high_priority_bypasses_exhausted_background_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("seg"))
            .mount(&server)
            .await;

        let config = PrefetchConfig {
            background_concurrency: 1,
            ..Default::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        let _held = transport.background.clone().acquire_owned().await.unwrap();
        assert_eq!(transport.available_background_permits(), 0);

        let url = Url::parse(&format!("{}/seg0.ts", server.uri())).unwrap();
        let body = tokio::time::timeout(
            Duration::from_secs(2),
            transport.get(&url, FetchPriority::High),
        )
        .await
        .expect("high priority must not wait for background permits")
        .unwrap();
        assert_eq!(&body[..], b"seg");
    }
}
