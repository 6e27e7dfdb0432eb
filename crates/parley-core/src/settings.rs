//! Settings port consumed by the completion engine.
//!
//! The engine never owns provider configuration. It reads through
//! [`SettingsStore`] and writes back only the model list and capability map
//! refreshed by model listing, one provider entry at a time.

use std::collections::HashMap;
use std::sync::RwLock;

use parley_types::error::SettingsError;
use parley_types::provider::ProviderConfig;

/// Provider settings keyed by provider id.
pub type ProviderSettings = HashMap<String, ProviderConfig>;

/// Source of provider configuration.
///
/// Implementations live with the host application (file, SQLite, keychain).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro)
/// for the bulk operations; `get_provider_config` stays synchronous because
/// it is called mid-request.
pub trait SettingsStore: Send + Sync {
    /// Snapshot of every provider's settings.
    fn get_settings(
        &self,
    ) -> impl std::future::Future<Output = Result<ProviderSettings, SettingsError>> + Send;

    /// Replace the provider settings map.
    fn update_settings(
        &self,
        settings: ProviderSettings,
    ) -> impl std::future::Future<Output = Result<(), SettingsError>> + Send;

    /// Edit one provider entry in place. Returns `false` when the id is
    /// unknown. Entries for other providers are left untouched, so
    /// concurrent updates to different providers never overwrite each other.
    fn update_provider<F>(
        &self,
        provider_id: &str,
        update: F,
    ) -> impl std::future::Future<Output = Result<bool, SettingsError>> + Send
    where
        F: FnOnce(&mut ProviderConfig) + Send;

    /// Look up one provider. `None` when the id is unknown.
    fn get_provider_config(&self, provider_id: &str) -> Option<ProviderConfig>;
}

/// Settings held in memory, seeded from `config.toml` by the CLI and by tests.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    providers: RwLock<ProviderSettings>,
}

impl InMemorySettingsStore {
    pub fn new(providers: ProviderSettings) -> Self {
        let providers = providers
            .into_iter()
            .map(|(id, mut config)| {
                if config.id.is_empty() {
                    config.id = id.clone();
                }
                (id, config)
            })
            .collect();
        Self {
            providers: RwLock::new(providers),
        }
    }
}

impl SettingsStore for InMemorySettingsStore {
    async fn get_settings(&self) -> Result<ProviderSettings, SettingsError> {
        self.providers
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| SettingsError::Storage(e.to_string()))
    }

    async fn update_settings(&self, settings: ProviderSettings) -> Result<(), SettingsError> {
        let mut guard = self
            .providers
            .write()
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        *guard = settings;
        Ok(())
    }

    async fn update_provider<F>(&self, provider_id: &str, update: F) -> Result<bool, SettingsError>
    where
        F: FnOnce(&mut ProviderConfig) + Send,
    {
        let mut guard = self
            .providers
            .write()
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        match guard.get_mut(provider_id) {
            Some(config) => {
                update(config);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_provider_config(&self, provider_id: &str) -> Option<ProviderConfig> {
        self.providers.read().ok()?.get(provider_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemorySettingsStore {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                endpoint: "http://localhost:11434/v1".to_string(),
                is_local: true,
                ..Default::default()
            },
        );
        InMemorySettingsStore::new(providers)
    }

    #[test]
    fn test_new_fills_id_from_key() {
        let config = store().get_provider_config("ollama").unwrap();
        assert_eq!(config.id, "ollama");
    }

    #[test]
    fn test_unknown_provider_is_none() {
        assert!(store().get_provider_config("nope").is_none());
    }

    #[tokio::test]
    async fn test_update_settings_replaces_map() {
        let store = store();
        let mut settings = store.get_settings().await.unwrap();
        settings.get_mut("ollama").unwrap().models = vec!["llama3".to_string()];
        store.update_settings(settings).await.unwrap();

        let config = store.get_provider_config("ollama").unwrap();
        assert_eq!(config.models, vec!["llama3".to_string()]);
    }

    #[tokio::test]
    async fn test_update_provider_edits_one_entry() {
        let store = store();
        let updated = store
            .update_provider("ollama", |config| config.models = vec!["qwen2".to_string()])
            .await
            .unwrap();
        assert!(updated);
        assert_eq!(
            store.get_provider_config("ollama").unwrap().models,
            vec!["qwen2".to_string()]
        );

        let missing = store.update_provider("nope", |_| {}).await.unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_updates_to_different_providers_are_independent() {
        let mut providers = ProviderSettings::new();
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert("groq".to_string(), ProviderConfig::default());
        let store = InMemorySettingsStore::new(providers);

        store
            .update_provider("openai", |c| c.models = vec!["gpt-4o".to_string()])
            .await
            .unwrap();
        store
            .update_provider("groq", |c| c.models = vec!["llama3".to_string()])
            .await
            .unwrap();

        assert_eq!(store.get_provider_config("openai").unwrap().models, vec!["gpt-4o"]);
        assert_eq!(store.get_provider_config("groq").unwrap().models, vec!["llama3"]);
    }
}
