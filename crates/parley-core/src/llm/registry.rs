//! Adapter registry for runtime protocol lookup.
//!
//! Provider ids map to a protocol family. Ids with no registration (custom
//! endpoints, new OpenAI-compatible vendors) resolve to the fallback
//! adapter, so adding a provider never needs a code change here.

use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::ProtocolAdapter;

/// Registry of protocol adapters, indexed by provider id.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProtocolAdapter>>,
    fallback: Arc<dyn ProtocolAdapter>,
}

impl AdapterRegistry {
    /// Create a registry whose unregistered ids resolve to `fallback`.
    pub fn new(fallback: Arc<dyn ProtocolAdapter>) -> Self {
        Self {
            adapters: HashMap::new(),
            fallback,
        }
    }

    /// Register an adapter under the given provider id, replacing any
    /// earlier registration.
    pub fn register(&mut self, provider_id: impl Into<String>, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(provider_id.into(), adapter);
    }

    /// Adapter for a provider id, falling back when unregistered.
    pub fn resolve(&self, provider_id: &str) -> Arc<dyn ProtocolAdapter> {
        self.adapters
            .get(provider_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}
