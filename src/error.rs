use thiserror::Error;

/// Errors produced while prefetching.
///
/// None of these ever reach the catalog or playback side: fetch failures
/// terminate inside the cache and are only logged. `Config` and `Catalog`
/// exist for the warm-up binary's startup path.
#[derive(Debug, Error)]
pub enum PrefetchError {
    /// The request was superseded or explicitly cancelled.
    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Empty payload from {0}")]
    EmptyPayload(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl PrefetchError {
    /// Cancellation is expected during normal operation and is never
    /// reported as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PrefetchError::Cancelled)
    }

    /// Whether a transport-level retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PrefetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PrefetchError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            PrefetchError::Cancelled
            | PrefetchError::EmptyPayload(_)
            | PrefetchError::InvalidUrl(_)
            | PrefetchError::Config(_)
            | PrefetchError::Catalog(_) => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PrefetchError::Cancelled => "cancelled",
            PrefetchError::Http(_) => "http",
            PrefetchError::HttpStatus { .. } => "status",
            PrefetchError::EmptyPayload(_) => "empty",
            PrefetchError::InvalidUrl(_) => "invalid_url",
            PrefetchError::Config(_) => "config",
            PrefetchError::Catalog(_) => "catalog",
        }
    }
}

pub type Result<T> = std::result::Result<T, PrefetchError>;
