//! OpenTelemetry GenAI Semantic Convention attribute names and values.
//!
//! `tracing` macros need literal field names, so spans spell the names out
//! inline; these constants are for `Span::record` on fields declared empty
//! and for the values the spans carry.

// --- Attribute names ---

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

// --- Operation name values ---

/// Chat completion, streamed or not.
pub const OP_CHAT: &str = "chat";

/// Model listing against a provider's `/models` endpoint.
pub const OP_LIST_MODELS: &str = "list_models";

/// Well-known `gen_ai.provider.name` value for a provider id. Ids without a
/// registered value are reported as-is.
pub fn provider_name(provider_id: &str) -> &str {
    match provider_id {
        "openai" => "openai",
        "anthropic" => "anthropic",
        "google" | "gemini" => "gcp.gemini",
        "groq" => "groq",
        "xai" => "x_ai",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_mapping() {
        assert_eq!(provider_name("google"), "gcp.gemini");
        assert_eq!(provider_name("xai"), "x_ai");
        assert_eq!(provider_name("anthropic"), "anthropic");
        assert_eq!(provider_name("my-proxy"), "my-proxy");
    }
}
