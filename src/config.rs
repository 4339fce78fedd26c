use crate::error::{PrefetchError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Leading catalog items considered per prefetch trigger.
pub const DEFAULT_MANIFEST_LIMIT: usize = 5;

/// Leading segments fetched for the priority item.
pub const DEFAULT_SEGMENT_LIMIT: usize = 3;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// A single attempt: the cache itself never retries, and the transport
/// follows suit unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

pub const DEFAULT_BACKGROUND_CONCURRENCY: usize = 4;

/// Prefetch configuration, normally loaded from environment variables.
#[derive(Clone, Debug, PartialEq)]
pub struct PrefetchConfig {
    /// How many leading catalog items a trigger considers
    pub manifest_limit: usize,
    /// How many leading segments of the priority item are fetched
    pub segment_limit: usize,
    /// Per-request timeout for the HTTP transport
    pub request_timeout: Duration,
    /// Transport attempts per request (0 is treated as 1)
    pub max_attempts: u32,
    /// Sleep between transport attempts
    pub retry_backoff: Duration,
    /// Concurrent background (low priority) requests allowed by the HTTP transport
    pub background_concurrency: usize,
    /// JSON catalog used by the warm-up binary
    pub catalog_path: Option<PathBuf>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            manifest_limit: DEFAULT_MANIFEST_LIMIT,
            segment_limit: DEFAULT_SEGMENT_LIMIT,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            background_concurrency: DEFAULT_BACKGROUND_CONCURRENCY,
            catalog_path: None,
        }
    }
}

impl PrefetchConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults; a variable that is set
    /// but does not parse is an error.
    pub fn from_env() -> Result<Self> {
        let manifest_limit = parse_var("PREFETCH_MANIFEST_LIMIT", DEFAULT_MANIFEST_LIMIT)?;
        let segment_limit = parse_var("PREFETCH_SEGMENT_LIMIT", DEFAULT_SEGMENT_LIMIT)?;

        let request_timeout = Duration::from_millis(parse_var(
            "PREFETCH_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);

        let max_attempts = parse_var("PREFETCH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;

        let retry_backoff = Duration::from_millis(parse_var(
            "PREFETCH_RETRY_BACKOFF_MS",
            DEFAULT_RETRY_BACKOFF_MS,
        )?);

        let background_concurrency = parse_var(
            "PREFETCH_BACKGROUND_CONCURRENCY",
            DEFAULT_BACKGROUND_CONCURRENCY,
        )?;

        let catalog_path = env::var("CATALOG_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(PrefetchConfig {
            manifest_limit,
            segment_limit,
            request_timeout,
            max_attempts,
            retry_backoff,
            background_concurrency,
            catalog_path,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PrefetchError::Config(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
