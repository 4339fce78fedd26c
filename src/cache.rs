//! Speculative prefetch cache for video manifests and leading segments.
//!
//! Given the catalog in display order, the cache fetches the manifests of
//! the first few items in the background so playback can start from memory.
//! Only the first item of a batch (the one most likely to be played next)
//! also gets its leading segments fetched. Everything here is best-effort:
//! failures are logged and dropped, and a cache miss simply falls through to
//! a normal network load on the playback side.
//!
//! All three stores (manifests, segments, in-flight manifest fetches) live
//! behind one mutex. Every fetch runs as its own task; manifest fetches hold
//! a [`CancellationToken`] and a request id, and only the task whose id still
//! owns the in-flight entry may complete it.

use crate::catalog::CatalogItem;
use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::hls::parse_segments;
use crate::metrics;
use crate::transport::{FetchPriority, Transport};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;

/// How often [`PrefetchCache::wait_idle`] checks for outstanding tasks.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies one prefetched segment of one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub manifest_url: String,
    /// Position in manifest order
    pub index: usize,
}

impl SegmentKey {
    pub fn new(manifest_url: impl Into<String>, index: usize) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            index,
        }
    }
}

/// Point-in-time counts, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub manifest_count: usize,
    pub segment_key_count: usize,
    /// Cancellable manifest fetches still outstanding
    pub in_flight_count: usize,
    /// Spawned fetch tasks still running, segment fetches included
    pub pending_tasks: usize,
}

struct InFlightRequest {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CacheState {
    manifests: HashMap<String, Bytes>,
    /// Chunks in arrival order
    segments: HashMap<SegmentKey, Vec<Bytes>>,
    in_flight: HashMap<String, InFlightRequest>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    manifest_limit: usize,
    segment_limit: usize,
    state: Mutex<CacheState>,
    next_request_id: AtomicU64,
    tasks: TaskTracker,
}

/// Process-wide prefetch cache.
///
/// Cheap to clone; clones share the same stores. Build one at startup and
/// hand clones to the catalog and playback sides.
#[derive(Clone)]
pub struct PrefetchCache {
    inner: Arc<Inner>,
}

impl PrefetchCache {
    pub fn new(transport: Arc<dyn Transport>, config: &PrefetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                manifest_limit: config.manifest_limit,
                segment_limit: config.segment_limit,
                state: Mutex::new(CacheState::default()),
                next_request_id: AtomicU64::new(0),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Prefetch the leading items of `items` using the configured limit.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_prefetch(&self, items: &[CatalogItem]) {
        self.trigger_prefetch_with_limit(items, self.inner.manifest_limit);
    }

    /// Prefetch manifests for the first `limit` items.
    ///
    /// Items without a manifest URL, and URLs that are already cached or
    /// being fetched, are skipped. The first item of the truncated list is
    /// fetched at high priority and, once its manifest arrives, has its
    /// leading segments fetched too. Nothing is reported back; failures only
    /// show up in logs and metrics.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_prefetch_with_limit(&self, items: &[CatalogItem], limit: usize) {
        for (position, item) in items.iter().take(limit).enumerate() {
            let Some(manifest_url) = item.prefetch_url() else {
                debug!("Skipping '{}' ({}): no manifest URL", item.name, item.id);
                continue;
            };

            let priority = if position == 0 {
                FetchPriority::High
            } else {
                FetchPriority::Low
            };
            self.start_manifest_fetch(item, manifest_url, priority);
        }
    }

    fn start_manifest_fetch(&self, item: &CatalogItem, manifest_url: &str, priority: FetchPriority) {
        let url = match Url::parse(manifest_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "Not prefetching '{}': invalid manifest URL {}: {}",
                    item.name, manifest_url, e
                );
                return;
            }
        };

        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut state = self.state();
            if state.manifests.contains_key(manifest_url) {
                debug!("Manifest already cached: {}", manifest_url);
                return;
            }
            if state.in_flight.contains_key(manifest_url) {
                debug!("Manifest fetch already in flight: {}", manifest_url);
                return;
            }
            state.in_flight.insert(
                manifest_url.to_string(),
                InFlightRequest {
                    id,
                    cancel: cancel.clone(),
                },
            );
            metrics::set_in_flight(state.in_flight.len());
        }

        debug!(
            "Prefetching manifest for '{}' ({} priority): {}",
            item.name,
            priority.as_str(),
            manifest_url
        );

        let cache = self.clone();
        let key = manifest_url.to_string();
        let label = item.name.clone();
        self.inner.tasks.spawn(async move {
            cache
                .fetch_manifest(label, key, url, id, cancel, priority)
                .await;
        });
    }

    async fn fetch_manifest(
        self,
        label: String,
        key: String,
        url: Url,
        id: u64,
        cancel: CancellationToken,
        priority: FetchPriority,
    ) {
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PrefetchError::Cancelled),
            result = self.inner.transport.get(&url, priority) => result,
        };
        let result = result.and_then(|body| non_empty(body, &url));

        // Whoever removes the in-flight entry owns the outcome. If it is gone
        // (cancelled) or belongs to a newer request, this completion is void.
        let owned = {
            let mut state = self.state();
            let owns_entry = state.in_flight.get(&key).is_some_and(|req| req.id == id);
            if owns_entry {
                state.in_flight.remove(&key);
                metrics::set_in_flight(state.in_flight.len());
                if let Ok(body) = &result {
                    state
                        .manifests
                        .entry(key.clone())
                        .or_insert_with(|| body.clone());
                }
            }
            owns_entry
        };

        if !owned {
            metrics::record_fetch(metrics::MANIFEST, "cancelled");
            debug!("Discarding completion of cancelled manifest fetch {}", key);
            return;
        }

        metrics::record_duration(metrics::MANIFEST, start);

        match result {
            Ok(body) => {
                metrics::record_fetch(metrics::MANIFEST, "ok");
                info!(
                    "Prefetched manifest for '{}' ({} bytes in {}ms): {}",
                    label,
                    body.len(),
                    start.elapsed().as_millis(),
                    key
                );
                if priority == FetchPriority::High {
                    self.prefetch_segments(&body, &key, &url, &label);
                }
            }
            Err(e) if e.is_cancelled() => {
                metrics::record_fetch(metrics::MANIFEST, "cancelled");
                debug!("Manifest prefetch cancelled by transport: {}", key);
            }
            Err(e) => {
                metrics::record_fetch(metrics::MANIFEST, e.kind());
                warn!("Manifest prefetch failed for '{}' ({}): {}", label, key, e);
            }
        }
    }

    /// Fetch the leading segments of a manifest that just arrived.
    ///
    /// Segment fetches are fire-and-forget: they are not in the in-flight
    /// table and cannot be cancelled individually.
    fn prefetch_segments(&self, manifest: &[u8], manifest_key: &str, manifest_url: &Url, label: &str) {
        let segment_urls = parse_segments(manifest, manifest_url);
        if segment_urls.is_empty() {
            debug!("No segment references in manifest for '{}'", label);
            return;
        }

        let mut started = 0;
        for (index, segment_url) in segment_urls
            .into_iter()
            .take(self.inner.segment_limit)
            .enumerate()
        {
            let key = SegmentKey::new(manifest_key, index);
            let cached = self.state().segments.contains_key(&key);
            if cached {
                debug!("Segment {} of {} already cached", index, manifest_key);
                continue;
            }

            let cache = self.clone();
            self.inner
                .tasks
                .spawn(async move { cache.fetch_segment(key, segment_url).await });
            started += 1;
        }

        if started > 0 {
            info!("Prefetching {} segment(s) for '{}'", started, label);
        }
    }

    async fn fetch_segment(self, key: SegmentKey, url: Url) {
        let start = Instant::now();
        let result = self
            .inner
            .transport
            .get(&url, FetchPriority::High)
            .await
            .and_then(|body| non_empty(body, &url));
        metrics::record_duration(metrics::SEGMENT, start);

        match result {
            Ok(body) => {
                let len = body.len();
                self.state().segments.entry(key.clone()).or_default().push(body);
                metrics::record_fetch(metrics::SEGMENT, "ok");
                debug!(
                    "Prefetched segment {} of {} ({} bytes)",
                    key.index, key.manifest_url, len
                );
            }
            Err(e) if e.is_cancelled() => {
                metrics::record_fetch(metrics::SEGMENT, "cancelled");
                debug!("Segment prefetch cancelled: {}", url);
            }
            Err(e) => {
                metrics::record_fetch(metrics::SEGMENT, e.kind());
                warn!("Segment prefetch failed for {}: {}", url, e);
            }
        }
    }

    /// Whether a manifest for `manifest_url` is ready.
    pub fn is_cached(&self, manifest_url: &str) -> bool {
        self.state().manifests.contains_key(manifest_url)
    }

    /// Cached manifest bytes, if any. Never fetches.
    pub fn get_cached_manifest(&self, manifest_url: &str) -> Option<Bytes> {
        let hit = self.state().manifests.get(manifest_url).cloned();
        metrics::record_lookup(hit.is_some());
        if hit.is_some() {
            debug!("Prefetch cache HIT for {}", manifest_url);
        } else {
            debug!("Prefetch cache MISS for {}", manifest_url);
        }
        hit
    }

    /// Chunks received for segment `index` of `manifest_url`, in arrival order.
    ///
    /// Arrival order is not necessarily byte order; reassembly is up to the
    /// caller.
    pub fn get_cached_segments(&self, manifest_url: &str, index: usize) -> Option<Vec<Bytes>> {
        self.state()
            .segments
            .get(&SegmentKey::new(manifest_url, index))
            .cloned()
    }

    /// Cancel one in-flight manifest fetch. Returns whether one was pending.
    pub fn cancel(&self, manifest_url: &str) -> bool {
        let removed = {
            let mut state = self.state();
            let removed = state.in_flight.remove(manifest_url);
            metrics::set_in_flight(state.in_flight.len());
            removed
        };

        match removed {
            Some(request) => {
                request.cancel.cancel();
                debug!("Cancelled manifest prefetch: {}", manifest_url);
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight manifest fetch. Cached data is left alone.
    ///
    /// Returns how many fetches were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<InFlightRequest> = {
            let mut state = self.state();
            let drained = state.in_flight.drain().map(|(_, req)| req).collect();
            metrics::set_in_flight(0);
            drained
        };

        for request in &drained {
            request.cancel.cancel();
        }
        if !drained.is_empty() {
            debug!("Cancelled {} manifest prefetch(es)", drained.len());
        }
        drained.len()
    }

    /// Drop all cached manifests and segments.
    ///
    /// In-flight fetches keep running and may still populate the cache; call
    /// [`cancel_all`](Self::cancel_all) first for a full reset.
    pub fn clear(&self) {
        let mut state = self.state();
        let manifests = state.manifests.len();
        let segments = state.segments.len();
        state.manifests.clear();
        state.segments.clear();
        drop(state);
        info!(
            "Cleared prefetch cache ({} manifests, {} segment keys)",
            manifests, segments
        );
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            manifest_count: state.manifests.len(),
            segment_key_count: state.segments.len(),
            in_flight_count: state.in_flight.len(),
            pending_tasks: self.inner.tasks.len(),
        }
    }

    /// Resolves once no spawned fetch task is still running.
    pub async fn wait_idle(&self) {
        while !self.inner.tasks.is_empty() {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PrefetchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchCache")
            .field("manifest_limit", &self.inner.manifest_limit)
            .field("segment_limit", &self.inner.segment_limit)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn non_empty(body: Bytes, url: &Url) -> Result<Bytes> {
    if body.is_empty() {
        Err(PrefetchError::EmptyPayload(url.to_string()))
    } else {
        Ok(body)
    }
}
