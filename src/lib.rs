//! Speculative prefetch cache for video manifests and leading segments.
//!
//! Build one [`PrefetchCache`] at startup with a [`Transport`] and a
//! [`PrefetchConfig`], feed it catalog items as the user navigates, and have
//! the playback side consult [`PrefetchCache::get_cached_manifest`] before
//! going to the network.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hls;
pub mod http_retry;
pub mod metrics;
pub mod transport;

pub use cache::{CacheStats, PrefetchCache, SegmentKey};
pub use catalog::CatalogItem;
pub use config::PrefetchConfig;
pub use error::{PrefetchError, Result};
pub use transport::{FetchPriority, ReqwestTransport, Transport};
