//! Catalog items handed to the prefetch cache.

use crate::error::{PrefetchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One playable unit from the content catalog.
///
/// The cache never owns these; `id` and `name` are used for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Absent or empty means the item cannot be prefetched
    #[serde(default, alias = "manifestUrl")]
    pub manifest_url: Option<String>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, manifest_url: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manifest_url,
        }
    }

    /// The manifest URL if this item is prefetchable.
    pub fn prefetch_url(&self) -> Option<&str> {
        self.manifest_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Parse a catalog from a JSON array of items.
pub fn parse_catalog(json: &str) -> Result<Vec<CatalogItem>> {
    serde_json::from_str(json)
        .map_err(|e| PrefetchError::Catalog(format!("Invalid catalog JSON: {e}")))
}

/// Read and parse a JSON catalog file.
pub async fn load_catalog(path: &Path) -> Result<Vec<CatalogItem>> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        PrefetchError::Catalog(format!("Failed to read {}: {e}", path.display()))
    })?;
    parse_catalog(&json)
}
