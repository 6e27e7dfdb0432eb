//! LLM provider implementations.
//!
//! Concrete [`ProtocolAdapter`]s for the OpenAI-compatible and Anthropic
//! wire protocols, plus the collaborators the [`CompletionEngine`] wires
//! together: pricing, capability detection, and local runner startup.
//!
//! [`ProtocolAdapter`]: parley_core::llm::adapter::ProtocolAdapter
//! [`CompletionEngine`]: engine::CompletionEngine

pub mod anthropic;
pub mod capability;
pub mod defaults;
pub mod engine;
pub mod local_runner;
pub mod openai_compat;
pub mod pricing;

use std::sync::Arc;

use parley_core::llm::registry::AdapterRegistry;
use parley_types::config::EngineConfig;

use self::anthropic::AnthropicAdapter;
use self::defaults::{ProtocolFamily, known_providers};
use self::openai_compat::OpenAiCompatAdapter;

/// Adapter registry for every known provider id. Custom ids fall back to
/// the OpenAI-compatible adapter.
pub fn default_adapters(config: &EngineConfig) -> AdapterRegistry {
    let openai = Arc::new(OpenAiCompatAdapter::new());
    let anthropic = Arc::new(AnthropicAdapter::new(config.anthropic_max_tokens));
    let gemini = Arc::new(OpenAiCompatAdapter::gemini());

    let mut registry = AdapterRegistry::new(openai.clone());
    for known in known_providers() {
        match known.family {
            ProtocolFamily::OpenAiCompat => registry.register(known.id, openai.clone()),
            ProtocolFamily::Anthropic => registry.register(known.id, anthropic.clone()),
            ProtocolFamily::Gemini => registry.register(known.id, gemini.clone()),
        }
    }
    registry.register("gemini", gemini);
    registry
}

#[cfg(test)]
mod tests {
    use parley_core::llm::adapter::ProtocolAdapter;

    use super::*;

    #[test]
    fn test_default_adapters_by_family() {
        let registry = default_adapters(&EngineConfig::default());
        assert_eq!(registry.resolve("anthropic").family(), "anthropic");
        assert_eq!(registry.resolve("google").family(), "gemini");
        assert_eq!(registry.resolve("gemini").family(), "gemini");
        assert_eq!(registry.resolve("groq").family(), "openai_compat");
        assert_eq!(registry.resolve("my-proxy").family(), "openai_compat");
    }
}
