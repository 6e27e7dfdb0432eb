//! Provider configuration and model capability types.
//!
//! `ProviderConfig` is owned by the settings collaborator; the engine only
//! reads it. The API key is a [`SecretString`] and never shows up in
//! `Debug` output.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Connection settings for one provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Provider id (`openai`, `anthropic`, `ollama`, ...). Filled from the
    /// settings map key when omitted in the file.
    #[serde(default)]
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL without `/chat/completions` or `/messages`.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub enabled_models: Option<Vec<String>>,
    /// Local runner (Ollama, vLLM, llama.cpp). Local providers need no key.
    #[serde(default)]
    pub is_local: bool,
    /// Shell command that starts the local server when it is not reachable.
    #[serde(default)]
    pub start_command: Option<String>,
    /// Path polled to check local server health. Defaults to `/health`.
    #[serde(default)]
    pub health_path: Option<String>,
    #[serde(default)]
    pub model_capabilities: HashMap<String, ModelCapabilities>,
}

impl ProviderConfig {
    /// A provider is configured when it runs locally or carries an API key.
    pub fn is_configured(&self) -> bool {
        self.is_local || self.api_key.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Models offered to the user: the enabled subset when one is set.
    pub fn visible_models(&self) -> Vec<String> {
        match &self.enabled_models {
            Some(enabled) => self
                .models
                .iter()
                .filter(|m| enabled.contains(m))
                .cloned()
                .collect(),
            None => self.models.clone(),
        }
    }

    /// Endpoint with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Per-field values the user pinned by hand. `None` means "not overridden".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multimodal: Option<bool>,
}

impl ManualOverrides {
    pub fn is_empty(&self) -> bool {
        self.vision.is_none()
            && self.audio.is_none()
            && self.files.is_none()
            && self.multimodal.is_none()
    }
}

/// Input modalities a model accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub files: bool,
    #[serde(default)]
    pub multimodal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_overrides: Option<ManualOverrides>,
}

/// Provider entry exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    pub models: Vec<String>,
}
