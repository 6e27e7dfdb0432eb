//! Token estimation for pre-send estimates and missing provider usage.
//!
//! Anthropic models use a character-ratio estimator (Claude's tokenizer is
//! not published as a BPE table). Every other provider shares `cl100k_base`,
//! which is exact for OpenAI and an approximation elsewhere.

use std::sync::OnceLock;

use serde_json::Value;
use tiktoken_rs::CoreBPE;

use parley_types::llm::{Message, TokenUsage};

use super::usage;

/// Average characters per token for Claude-family text.
const CLAUDE_CHARS_PER_TOKEN: f64 = 3.5;

/// Per-message wrapping overhead (role/content framing).
const MESSAGE_OVERHEAD: u32 = 4;

/// Per-request overhead for the message array (reply priming).
pub const REQUEST_OVERHEAD: u32 = 2;

/// Token counter with a lazily loaded, instance-owned BPE table.
#[derive(Default)]
pub struct TokenCounter {
    bpe: OnceLock<Option<CoreBPE>>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("bpe_loaded", &matches!(self.bpe.get(), Some(Some(_))))
            .finish()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens in `text` for the given provider. The model is accepted for
    /// future per-model encodings; today only the provider matters.
    pub fn count_tokens(&self, text: &str, provider: &str, _model: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        if provider == "anthropic" {
            return claude_estimate(text);
        }
        match self.bpe() {
            Some(bpe) => saturate(bpe.encode_with_special_tokens(text).len()),
            None => claude_estimate(text),
        }
    }

    /// Σ(4 + tokens(role) + tokens(content)) + 2 over the conversation.
    pub fn count_message_tokens(&self, messages: &[Message], provider: &str, model: &str) -> u32 {
        messages
            .iter()
            .map(|m| self.message_tokens(m, provider, model))
            .fold(REQUEST_OVERHEAD, u32::saturating_add)
    }

    /// Tokens one message contributes, including its wrapping overhead.
    pub fn message_tokens(&self, message: &Message, provider: &str, model: &str) -> u32 {
        MESSAGE_OVERHEAD
            .saturating_add(self.count_tokens(message.role.as_str(), provider, model))
            .saturating_add(self.count_tokens(&message.content, provider, model))
    }

    /// Provider-reported usage from a response body; `None` when omitted.
    pub fn parse_usage_from_response(&self, response: &Value, provider: &str) -> Option<TokenUsage> {
        usage::parse_usage_from_response(response, provider)
    }

    fn bpe(&self) -> Option<&CoreBPE> {
        self.bpe
            .get_or_init(|| match tiktoken_rs::cl100k_base() {
                Ok(bpe) => Some(bpe),
                Err(e) => {
                    tracing::warn!(error = %e, "cl100k_base unavailable, using character estimate");
                    None
                }
            })
            .as_ref()
    }
}

fn claude_estimate(text: &str) -> u32 {
    let chars = text.chars().count() as f64;
    saturate((chars / CLAUDE_CHARS_PER_TOKEN).ceil() as usize)
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
