use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vidprefetch::catalog::load_catalog;
use vidprefetch::{PrefetchCache, PrefetchConfig, ReqwestTransport};

/// Upper bound on a warm-up run, in request timeouts.
const WARMUP_TIMEOUT_FACTOR: u32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    info!("Starting vidprefetch warm-up");

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder unavailable: {}", e);
            None
        }
    };

    let config = match PrefetchConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let Some(catalog_path) = config.catalog_path.clone() else {
        error!("CATALOG_PATH is required");
        std::process::exit(1);
    };

    let items = match load_catalog(&catalog_path).await {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to load catalog: {}", e);
            std::process::exit(1);
        }
    };

    let transport = match ReqwestTransport::new(&config) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to create HTTP transport: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Warming {} of {} catalog items (segment limit {})",
        items.len().min(config.manifest_limit),
        items.len(),
        config.segment_limit
    );

    let cache = PrefetchCache::new(Arc::new(transport), &config);
    cache.trigger_prefetch(&items);

    let deadline = config.request_timeout * WARMUP_TIMEOUT_FACTOR;
    if tokio::time::timeout(deadline, cache.wait_idle()).await.is_err() {
        warn!(
            "Warm-up still running after {}ms, cancelling",
            deadline.as_millis()
        );
        cache.cancel_all();
        // Cancelled manifest tasks return promptly; untracked segment fetches
        // are bounded by the request timeout.
        let _ = tokio::time::timeout(Duration::from_secs(1), cache.wait_idle()).await;
    }

    let stats = cache.stats();
    info!(
        "Warm-up finished: {} manifests, {} segment keys, {} in flight",
        stats.manifest_count, stats.segment_key_count, stats.in_flight_count
    );
    for item in &items {
        if let Some(url) = item.prefetch_url() {
            debug!("{} '{}': cached={}", item.id, item.name, cache.is_cached(url));
        }
    }

    if let Some(handle) = metrics_handle {
        debug!("Metrics snapshot:\n{}", handle.render());
    }
}
