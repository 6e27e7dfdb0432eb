//! Configuration types for Parley.
//!
//! `AppConfig` represents the top-level `config.toml`: engine tuning,
//! user pricing overrides, and the provider map handed to the settings store.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderConfig;

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-1K-token price overrides; these win over the built-in table.
    #[serde(default)]
    pub pricing: Vec<PricingOverride>,

    /// Provider settings keyed by provider id.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Tuning knobs for the completion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A stream that delivers no bytes for this long fails with a transport error.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,

    /// Health polls after spawning a local runner before giving up.
    #[serde(default = "default_local_start_attempts")]
    pub local_start_attempts: u32,

    #[serde(default = "default_local_start_interval_ms")]
    pub local_start_interval_ms: u64,

    /// `max_tokens` sent to Anthropic, which requires the field.
    #[serde(default = "default_anthropic_max_tokens")]
    pub anthropic_max_tokens: u32,

    /// Model catalog in models.dev `api.json` shape.
    #[serde(default = "default_capability_catalog_url")]
    pub capability_catalog_url: String,

    #[serde(default = "default_capability_cache_ttl_secs")]
    pub capability_cache_ttl_secs: u64,

    /// Upper bound on one catalog fetch, body included.
    #[serde(default = "default_capability_fetch_timeout_secs")]
    pub capability_fetch_timeout_secs: u64,
}

fn default_stream_idle_timeout_secs() -> u64 {
    120
}

fn default_local_start_attempts() -> u32 {
    30
}

fn default_local_start_interval_ms() -> u64 {
    1_000
}

fn default_anthropic_max_tokens() -> u32 {
    4_096
}

fn default_capability_catalog_url() -> String {
    "https://models.dev/api.json".to_string()
}

fn default_capability_cache_ttl_secs() -> u64 {
    3_600
}

fn default_capability_fetch_timeout_secs() -> u64 {
    10
}

impl EngineConfig {
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn local_start_interval(&self) -> Duration {
        Duration::from_millis(self.local_start_interval_ms)
    }

    pub fn capability_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.capability_cache_ttl_secs)
    }

    pub fn capability_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_fetch_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            local_start_attempts: default_local_start_attempts(),
            local_start_interval_ms: default_local_start_interval_ms(),
            anthropic_max_tokens: default_anthropic_max_tokens(),
            capability_catalog_url: default_capability_catalog_url(),
            capability_cache_ttl_secs: default_capability_cache_ttl_secs(),
            capability_fetch_timeout_secs: default_capability_fetch_timeout_secs(),
        }
    }
}

/// User-supplied price for a provider/model pair, in USD per 1K tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingOverride {
    pub provider: String,
    pub model: String,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}
