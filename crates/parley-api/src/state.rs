//! Application state wiring the engine to its configuration.
//!
//! The CLI seeds an in-memory settings store from `config.toml`; a desktop
//! host would plug in its own [`SettingsStore`](parley_core::settings::SettingsStore).

use std::path::PathBuf;

use parley_core::settings::InMemorySettingsStore;
use parley_infra::config::{load_config, resolve_data_dir};
use parley_infra::llm::engine::CompletionEngine;

/// Engine pinned to the in-memory settings store.
pub type Engine = CompletionEngine<InMemorySettingsStore>;

/// Shared application state for CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load `config.toml` from the data directory and build the engine.
    pub async fn init() -> Self {
        let data_dir = resolve_data_dir();
        let config = load_config(&data_dir).await;
        tracing::debug!(
            data_dir = %data_dir.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );

        let settings = InMemorySettingsStore::new(config.providers.clone());
        let engine = CompletionEngine::new(settings, &config);
        Self { engine, data_dir }
    }
}
