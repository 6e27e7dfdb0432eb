//! Local runners (Ollama, vLLM, llama.cpp).
//!
//! Before a request goes to a local provider the engine asks
//! [`LocalRunnerLauncher::ensure_running`] to make sure the server answers
//! its health check. When it does not, the configured `start_command` is
//! spawned and the check is retried a bounded number of times.
//!
//! The launcher also reports whether a runner is installed ([`detect`]) and
//! which models are available locally ([`discovery`]).

pub mod detect;
pub mod discovery;

use std::process::Stdio;
use std::time::Duration;

use parley_types::llm::LlmError;
use parley_types::local::{ModelDiscovery, RunnerDetection, RunnerStatus};
use parley_types::provider::ProviderConfig;

use self::discovery::LocalModelScanner;
use super::defaults::default_health_path;

/// Per-check request timeout.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Ensures local LLM servers are reachable, starting them if needed.
#[derive(Debug, Clone)]
pub struct LocalRunnerLauncher {
    client: reqwest::Client,
    attempts: u32,
    interval: Duration,
    scanner: LocalModelScanner,
}

impl LocalRunnerLauncher {
    /// Launcher scanning the platform's default model stores.
    pub fn new(client: reqwest::Client, attempts: u32, interval: Duration) -> Self {
        Self {
            client,
            attempts,
            interval,
            scanner: LocalModelScanner::from_platform(),
        }
    }

    /// Replace the on-disk model locations used by [`Self::discover_models`].
    pub fn with_scanner(mut self, scanner: LocalModelScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Return once the provider's health check succeeds.
    ///
    /// Fails with [`LlmError::LocalRunner`] when the server is down and either
    /// no start command is configured or it never became healthy.
    pub async fn ensure_running(&self, config: &ProviderConfig) -> Result<(), LlmError> {
        let url = health_url(config);
        if self.is_healthy(&url).await {
            return Ok(());
        }

        let name = config.display_name();
        let Some(command) = config.start_command.as_deref().filter(|c| !c.trim().is_empty())
        else {
            return Err(LlmError::LocalRunner(format!(
                "Failed to start local LLM {name}: server is not reachable at {url} and no start command is configured"
            )));
        };

        tracing::info!(provider = %config.id, %command, "starting local LLM server");
        spawn_detached(command).map_err(|e| {
            LlmError::LocalRunner(format!("Failed to start local LLM {name}: {e}"))
        })?;

        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;
            if self.is_healthy(&url).await {
                tracing::info!(provider = %config.id, attempt, "local LLM server is up");
                return Ok(());
            }
            tracing::debug!(provider = %config.id, attempt, "local LLM server not ready yet");
        }

        Err(LlmError::LocalRunner(format!(
            "Failed to start local LLM {name}: no response from {url} after {} attempts",
            self.attempts
        )))
    }

    /// Whether the runner is installed, whether its server answers, and
    /// the version its binary reports. Never fails; absent facts are `None`.
    pub async fn detect(&self, config: &ProviderConfig) -> RunnerDetection {
        let binary_path = detect::binary_name(config).and_then(|name| detect::find_binary(&name));
        let api_accessible = self.is_healthy(&health_url(config)).await;
        let version = match &binary_path {
            Some(path) => detect::binary_version(path).await,
            None => None,
        };

        let status = RunnerStatus::from_checks(binary_path.is_some(), api_accessible);
        tracing::debug!(provider = %config.id, %status, "local runner detected");
        RunnerDetection {
            provider: config.id.clone(),
            status,
            binary_path,
            api_accessible,
            version,
        }
    }

    /// Models available locally. A reachable Ollama server (`ollama` is its
    /// provider config) is asked for its tags; otherwise Ollama's on-disk
    /// store is scanned. LM Studio folders are always scanned.
    pub async fn discover_models(&self, ollama: &ProviderConfig) -> ModelDiscovery {
        let mut found = ModelDiscovery::default();
        let scan_ollama_store = match discovery::list_ollama_tags(&self.client, &runner_root(ollama)).await {
            Ok(models) => {
                for model in models {
                    found.push(model);
                }
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ollama server not answering, scanning its model store");
                true
            }
        };

        let scanner = self.scanner.clone();
        match tokio::task::spawn_blocking(move || scanner.scan(scan_ollama_store)).await {
            Ok(on_disk) => found.merge(on_disk),
            Err(e) => found.errors.push(format!("model scan failed: {e}")),
        }
        found
    }

    async fn is_healthy(&self, url: &str) -> bool {
        match self.client.get(url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Server root: the endpoint without a trailing `/v1`.
fn runner_root(config: &ProviderConfig) -> String {
    let base = config.base_url();
    base.strip_suffix("/v1").unwrap_or(base).to_string()
}

/// `{server root}{health path}`.
fn health_url(config: &ProviderConfig) -> String {
    let root = runner_root(config);
    let path = config
        .health_path
        .as_deref()
        .unwrap_or_else(|| default_health_path(&config.id));
    if path.starts_with('/') {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

/// Spawn the start command through the platform shell without waiting on it.
fn spawn_detached(command: &str) -> std::io::Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false)
        .spawn()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use serde_json::json;
    use tempfile::TempDir;

    use parley_types::local::{ModelFormat, ModelSource};

    use super::*;

    fn launcher() -> LocalRunnerLauncher {
        LocalRunnerLauncher::new(reqwest::Client::new(), 3, Duration::from_millis(20))
            .with_scanner(LocalModelScanner::default())
    }

    fn write(path: &std::path::Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    /// An Ollama store with one pulled model plus an LM Studio folder with
    /// one GGUF file.
    fn model_stores() -> (TempDir, LocalModelScanner) {
        let root = TempDir::new().unwrap();
        let manifest = json!({"layers": [{
            "mediaType": "application/vnd.ollama.image.model",
            "digest": "sha256:abc",
            "size": 300
        }]});
        write(
            &root.path().join("ollama/manifests/registry.ollama.ai/library/phi3/mini"),
            manifest.to_string().as_bytes(),
        );
        write(&root.path().join("lmstudio/org/repo/qwen2.gguf"), &[0u8; 20]);
        let scanner = LocalModelScanner::new(
            Some(root.path().join("ollama")),
            vec![root.path().join("lmstudio")],
        );
        (root, scanner)
    }

    fn local_config(endpoint: String, start_command: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: "vllm".to_string(),
            endpoint,
            is_local: true,
            start_command: start_command.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_health_url_strips_v1() {
        let config = ProviderConfig {
            id: "ollama".to_string(),
            endpoint: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(health_url(&config), "http://localhost:11434/api/tags");

        let config = ProviderConfig {
            id: "custom".to_string(),
            endpoint: "http://127.0.0.1:5000".to_string(),
            health_path: Some("ping".to_string()),
            ..Default::default()
        };
        assert_eq!(health_url(&config), "http://127.0.0.1:5000/ping");
    }

    #[tokio::test]
    async fn test_healthy_server_needs_no_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = local_config(format!("{}/v1", server.uri()), None);
        launcher().ensure_running(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_without_start_command_fails() {
        let server = MockServer::start().await;
        let config = local_config(format!("{}/v1", server.uri()), None);

        let err = launcher().ensure_running(&config).await.unwrap_err();
        assert!(matches!(err, LlmError::LocalRunner(_)));
        assert!(err.to_string().contains("Failed to start local LLM"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_command_then_poll_until_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = local_config(format!("{}/v1", server.uri()), Some("true"));
        launcher().ensure_running(&config).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = local_config(format!("{}/v1", server.uri()), Some("true"));
        let err = launcher().ensure_running(&config).await.unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_detect_running_without_binary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let config = local_config(format!("{}/v1", server.uri()), None);
        let config = ProviderConfig {
            id: "my-runner".to_string(),
            ..config
        };

        let detection = launcher().detect(&config).await;
        assert_eq!(detection.provider, "my-runner");
        assert_eq!(detection.status, RunnerStatus::Running);
        assert!(detection.api_accessible);
        assert!(detection.binary_path.is_none());
        assert!(detection.version.is_none());
    }

    #[tokio::test]
    async fn test_detect_not_installed() {
        let server = MockServer::start().await;
        let config = ProviderConfig {
            id: "my-runner".to_string(),
            ..local_config(format!("{}/v1", server.uri()), None)
        };

        let detection = launcher().detect(&config).await;
        assert_eq!(detection.status, RunnerStatus::NotInstalled);
        assert!(!detection.api_accessible);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detect_installed_not_running_reports_version() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let binary = tools.path().join("my-runner");
        std::fs::write(&binary, "#!/bin/sh\necho 'my-runner version is 0.4.2'\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let server = MockServer::start().await;
        let command = format!("{} serve", binary.display());
        let config = ProviderConfig {
            id: "my-runner".to_string(),
            ..local_config(format!("{}/v1", server.uri()), Some(&command))
        };

        let detection = launcher().detect(&config).await;
        assert_eq!(detection.status, RunnerStatus::InstalledNotRunning);
        assert_eq!(detection.binary_path.as_deref(), Some(binary.as_path()));
        assert_eq!(detection.version.as_deref(), Some("0.4.2"));
    }

    #[tokio::test]
    async fn test_discover_prefers_running_ollama_over_its_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3:latest", "size": 1000, "details": {"format": "gguf"}}]
            })))
            .mount(&server)
            .await;
        let (_root, scanner) = model_stores();
        let ollama = ProviderConfig {
            id: "ollama".to_string(),
            endpoint: format!("{}/v1", server.uri()),
            is_local: true,
            ..Default::default()
        };

        let mut found = launcher().with_scanner(scanner).discover_models(&ollama).await;
        found.models.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<&str> = found.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3:latest", "qwen2"]);
        assert_eq!(found.total_size_bytes, 1020);
        assert_eq!(found.models[1].source, ModelSource::LmStudio);
        assert!(found.errors.is_empty());
    }

    #[tokio::test]
    async fn test_discover_scans_ollama_store_when_server_down() {
        let server = MockServer::start().await;
        let (_root, scanner) = model_stores();
        let ollama = ProviderConfig {
            id: "ollama".to_string(),
            endpoint: format!("{}/v1", server.uri()),
            is_local: true,
            ..Default::default()
        };

        let mut found = launcher().with_scanner(scanner).discover_models(&ollama).await;
        found.models.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(found.total_count(), 2);
        assert_eq!(found.models[0].name, "phi3:mini");
        assert_eq!(found.models[0].source, ModelSource::Ollama);
        assert_eq!(found.models[0].size_bytes, 300);
        assert_eq!(found.models[1].format, Some(ModelFormat::Gguf));
    }
}
