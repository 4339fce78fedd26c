//! HTTP transport seam used by the prefetch cache.

mod http;

pub use http::ReqwestTransport;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

/// Scheduling hint attached to every transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPriority {
    /// The item the user is most likely to play next, and its segments
    High,
    /// Speculative work for items further down the catalog
    Low,
}

impl FetchPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPriority::High => "high",
            FetchPriority::Low => "low",
        }
    }
}

/// Issues GET requests on behalf of the cache.
///
/// Cancellation is by drop: the cache abandons the returned future when a
/// request is cancelled, and implementations must tolerate that at any
/// await point. An implementation that observes cancellation itself should
/// report [`PrefetchError::Cancelled`](crate::error::PrefetchError::Cancelled)
/// rather than a generic failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full body at `url`.
    async fn get(&self, url: &Url, priority: FetchPriority) -> Result<Bytes>;
}
