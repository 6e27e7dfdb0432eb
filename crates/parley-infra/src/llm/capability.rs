//! Model capability detection from a models.dev-style catalog.
//!
//! The catalog (`api.json`) maps provider -> models -> metadata:
//!
//! ```text
//! { "openai": { "models": { "gpt-4o": {
//!     "attachment": true,
//!     "modalities": { "input": ["text", "image"], "output": ["text"] },
//!     "limit": { "context": 128000, "output": 16384 } } } } }
//! ```
//!
//! Detection never fails: any fetch or decode problem is logged and the
//! caller gets an empty map. Each fetch is bounded by a request timeout, so
//! a stalled catalog delays model listing by at most that long.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use parley_types::provider::ModelCapabilities;

/// Why a catalog fetch failed. Internal; logged and swallowed.
#[derive(Debug, Error)]
enum CapabilityError {
    /// Connect, timeout, or body decode failure.
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Deserialize)]
struct CatalogProvider {
    #[serde(default)]
    models: HashMap<String, CatalogModel>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogModel {
    #[serde(default)]
    attachment: bool,
    #[serde(default)]
    modalities: CatalogModalities,
    #[serde(default)]
    limit: CatalogLimit,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogModalities {
    #[serde(default)]
    input: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogLimit {
    #[serde(default)]
    context: Option<u32>,
}

impl CatalogModel {
    fn to_capabilities(&self) -> ModelCapabilities {
        let has = |m: &str| self.modalities.input.iter().any(|i| i == m);
        ModelCapabilities {
            vision: has("image"),
            audio: has("audio"),
            files: self.attachment || has("pdf"),
            multimodal: self.modalities.input.iter().any(|i| i != "text"),
            context_length: self.limit.context,
            manual_overrides: None,
        }
    }
}

type CapabilityIndex = HashMap<String, ModelCapabilities>;

/// Flatten the catalog into model id -> capabilities. The first provider
/// listing an id wins; provider order is sorted for determinism.
fn build_index(catalog: HashMap<String, CatalogProvider>) -> CapabilityIndex {
    let mut providers: Vec<_> = catalog.into_iter().collect();
    providers.sort_by(|a, b| a.0.cmp(&b.0));

    let mut index = CapabilityIndex::new();
    for (_, provider) in providers {
        for (id, model) in provider.models {
            index.entry(id).or_insert_with(|| model.to_capabilities());
        }
    }
    index
}

/// Find a model in the index, retrying with the last path segment for
/// router-style ids such as `openai/gpt-4o`.
fn lookup<'a>(index: &'a CapabilityIndex, model_id: &str) -> Option<&'a ModelCapabilities> {
    index.get(model_id).or_else(|| {
        let (_, tail) = model_id.rsplit_once('/')?;
        index.get(tail)
    })
}

struct CachedCatalog {
    fetched_at: Instant,
    index: Arc<CapabilityIndex>,
}

/// Fetches and caches the capability catalog. Each detector owns its cache.
pub struct ModelCapabilityDetector {
    client: reqwest::Client,
    catalog_url: String,
    ttl: Duration,
    fetch_timeout: Duration,
    cache: Mutex<Option<CachedCatalog>>,
}

impl ModelCapabilityDetector {
    pub fn new(
        client: reqwest::Client,
        catalog_url: impl Into<String>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            catalog_url: catalog_url.into(),
            ttl,
            fetch_timeout,
            cache: Mutex::new(None),
        }
    }

    /// Capabilities for each id the catalog knows. Unknown ids are absent
    /// from the map; a failed fetch yields an empty map.
    pub async fn get_capabilities_for_models(
        &self,
        model_ids: &[String],
    ) -> HashMap<String, ModelCapabilities> {
        if model_ids.is_empty() {
            return HashMap::new();
        }

        let index = match self.index().await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, url = %self.catalog_url, "capability catalog unavailable");
                return HashMap::new();
            }
        };

        model_ids
            .iter()
            .filter_map(|id| lookup(&index, id).map(|caps| (id.clone(), caps.clone())))
            .collect()
    }

    async fn index(&self) -> Result<Arc<CapabilityIndex>, CapabilityError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.fetched_at.elapsed() < self.ttl) {
            return Ok(Arc::clone(&cached.index));
        }

        let index = Arc::new(self.fetch().await?);
        *cache = Some(CachedCatalog {
            fetched_at: Instant::now(),
            index: Arc::clone(&index),
        });
        Ok(index)
    }

    async fn fetch(&self) -> Result<CapabilityIndex, CapabilityError> {
        tracing::debug!(url = %self.catalog_url, "fetching capability catalog");
        let response = self
            .client
            .get(&self.catalog_url)
            .timeout(self.fetch_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Status(status.as_u16()));
        }
        let catalog: HashMap<String, CatalogProvider> = response.json().await?;
        Ok(build_index(catalog))
    }
}
