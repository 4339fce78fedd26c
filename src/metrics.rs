//! Prefetch metrics.
//!
//! Thin wrappers over the `metrics` facade so call sites stay terse.
//! Nothing is recorded unless a recorder is installed (the warm-up binary
//! installs the Prometheus one).

use std::time::Instant;

/// Manifest fetch, as labelled in `kind`.
pub const MANIFEST: &str = "manifest";
/// Segment fetch, as labelled in `kind`.
pub const SEGMENT: &str = "segment";

/// Count one finished fetch. `outcome` is `"ok"` or an error kind.
pub fn record_fetch(kind: &'static str, outcome: &'static str) {
    ::metrics::counter!("prefetch_fetches_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

pub fn record_duration(kind: &'static str, start: Instant) {
    ::metrics::histogram!("prefetch_fetch_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn set_in_flight(count: usize) {
    ::metrics::gauge!("prefetch_in_flight").set(count as f64);
}

/// Count a playback-side manifest lookup.
pub fn record_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    ::metrics::counter!("prefetch_lookups_total", "result" => result).increment(1);
}
