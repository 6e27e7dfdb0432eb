//! Configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production,
//! `PARLEY_DATA_DIR` when set) and deserializes it into [`AppConfig`].
//! Falls back to defaults when the file is missing or malformed, then fills
//! known-provider defaults (endpoint, display name, health path).

use std::path::{Path, PathBuf};

use parley_types::config::AppConfig;

use crate::llm::defaults::apply_defaults;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// Resolve the data directory: `$PARLEY_DATA_DIR`, else `~/.parley`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Provider entries get known-provider defaults applied either way.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    let mut config = match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return AppConfig::default();
        }
    };

    config.providers = config
        .providers
        .into_iter()
        .map(|(id, provider)| {
            let provider = apply_defaults(&id, provider);
            (id, provider)
        })
        .collect();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.stream_idle_timeout_secs, 120);
        assert!(config.providers.is_empty());
    }

    #[tokio::test]
    async fn load_config_valid_toml_applies_provider_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[engine]
anthropic_max_tokens = 8192

[providers.anthropic]
api_key = "sk-ant-test"
models = ["claude-3-5-sonnet-20241022"]

[providers.ollama]
models = ["llama3"]
start_command = "ollama serve"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.engine.anthropic_max_tokens, 8192);

        let anthropic = &config.providers["anthropic"];
        assert_eq!(anthropic.id, "anthropic");
        assert_eq!(anthropic.endpoint, "https://api.anthropic.com/v1");
        assert!(anthropic.is_configured());

        let ollama = &config.providers["ollama"];
        assert!(ollama.is_local);
        assert_eq!(ollama.endpoint, "http://localhost:11434/v1");
        assert_eq!(ollama.health_path.as_deref(), Some("/api/tags"));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert!(config.providers.is_empty());
        assert!(config.pricing.is_empty());
    }
}
