//! Per-provider defaults for well-known provider ids.
//!
//! Fills in what a user may leave out of `config.toml`: base URL, display
//! name, local-runner health path, and whether the provider reports usage
//! on streamed responses when asked.

use parley_types::provider::ProviderConfig;

/// Protocol family a provider id speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    OpenAiCompat,
    Anthropic,
    Gemini,
}

/// Static facts about one known provider.
#[derive(Debug, Clone, Copy)]
pub struct KnownProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub family: ProtocolFamily,
    pub is_local: bool,
    /// Honours `stream_options.include_usage`.
    pub stream_usage: bool,
}

const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        family: ProtocolFamily::Anthropic,
        is_local: false,
        stream_usage: false,
    },
    KnownProvider {
        id: "google",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        family: ProtocolFamily::Gemini,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "xai",
        name: "xAI",
        base_url: "https://api.x.ai/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "deepinfra",
        name: "DeepInfra",
        base_url: "https://api.deepinfra.com/v1/openai",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "fireworks",
        name: "Fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: false,
        stream_usage: true,
    },
    KnownProvider {
        id: "ollama",
        name: "Ollama",
        base_url: "http://localhost:11434/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: true,
        stream_usage: false,
    },
    KnownProvider {
        id: "vllm",
        name: "vLLM",
        base_url: "http://localhost:8000/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: true,
        stream_usage: true,
    },
    KnownProvider {
        id: "llamacpp",
        name: "llama.cpp",
        base_url: "http://localhost:8080/v1",
        family: ProtocolFamily::OpenAiCompat,
        is_local: true,
        stream_usage: false,
    },
];

/// Look up a known provider by id.
pub fn known_provider(id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id)
}

/// All known providers, in display order.
pub fn known_providers() -> &'static [KnownProvider] {
    KNOWN_PROVIDERS
}

/// Whether to request `stream_options.include_usage` for a provider id.
/// Custom endpoints are not asked; some servers reject unknown fields.
pub fn supports_stream_usage(id: &str) -> bool {
    known_provider(id).is_some_and(|p| p.stream_usage)
}

/// Health path polled before talking to a local runner.
pub fn default_health_path(id: &str) -> &'static str {
    match id {
        // Ollama has no /health; the tag listing is its cheapest health check.
        "ollama" => "/api/tags",
        _ => "/health",
    }
}

/// Executable of a known local runner, looked up when detecting installs.
pub fn runner_binary(id: &str) -> Option<&'static str> {
    match id {
        "ollama" => Some("ollama"),
        "vllm" => Some("vllm"),
        "llamacpp" => Some("llama-server"),
        _ => None,
    }
}

/// Fill unset fields of a provider config from the known-provider table.
pub fn apply_defaults(id: &str, mut config: ProviderConfig) -> ProviderConfig {
    if config.id.is_empty() {
        config.id = id.to_string();
    }
    if let Some(known) = known_provider(id) {
        if config.endpoint.is_empty() {
            config.endpoint = known.base_url.to_string();
        }
        if config.name.is_none() {
            config.name = Some(known.name.to_string());
        }
        config.is_local |= known.is_local;
    }
    if config.is_local && config.health_path.is_none() {
        config.health_path = Some(default_health_path(id).to_string());
    }
    config
}
