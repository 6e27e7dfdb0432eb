//! Extraction of provider-native usage fields.
//!
//! Three shapes are understood:
//! - OpenAI family: `usage.prompt_tokens` / `usage.completion_tokens`
//! - Anthropic: `usage.input_tokens` / `usage.output_tokens`
//! - Gemini: `promptTokenCount` / `candidatesTokenCount`, under `usage`
//!   or `usageMetadata`

use serde_json::Value;

use parley_types::llm::{PartialUsage, TokenUsage};

/// Protocol family whose usage shape a response follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    OpenAi,
    Anthropic,
    Gemini,
}

impl UsageShape {
    /// Shape for a provider id. Everything but Anthropic and Google speaks
    /// the OpenAI shape.
    pub fn for_provider(provider: &str) -> Self {
        match provider {
            "anthropic" => UsageShape::Anthropic,
            "google" | "gemini" => UsageShape::Gemini,
            _ => UsageShape::OpenAi,
        }
    }
}

/// Normalized usage from a full response, or `None` when absent.
///
/// A response reporting only one side is treated as absent; callers estimate.
pub fn parse_usage_from_response(json: &Value, provider: &str) -> Option<TokenUsage> {
    let partial = partial_usage(json, UsageShape::for_provider(provider));
    Some(TokenUsage::new(
        partial.prompt_tokens?,
        partial.completion_tokens?,
    ))
}

/// Whatever usage fields `json` carries in the given shape.
pub fn partial_usage(json: &Value, shape: UsageShape) -> PartialUsage {
    match shape {
        UsageShape::OpenAi => openai_usage(json),
        UsageShape::Anthropic => anthropic_usage(json),
        UsageShape::Gemini => {
            let gemini = gemini_usage(json);
            if gemini.is_empty() {
                openai_usage(json)
            } else {
                gemini
            }
        }
    }
}

fn openai_usage(json: &Value) -> PartialUsage {
    let usage = json.get("usage");
    PartialUsage {
        prompt_tokens: usage.and_then(|u| read_u32(u, "prompt_tokens")),
        completion_tokens: usage.and_then(|u| read_u32(u, "completion_tokens")),
    }
}

fn anthropic_usage(json: &Value) -> PartialUsage {
    let usage = json.get("usage");
    PartialUsage {
        prompt_tokens: usage.and_then(|u| read_u32(u, "input_tokens")),
        completion_tokens: usage.and_then(|u| read_u32(u, "output_tokens")),
    }
}

fn gemini_usage(json: &Value) -> PartialUsage {
    let usage = json.get("usageMetadata").or_else(|| json.get("usage"));
    PartialUsage {
        prompt_tokens: usage.and_then(|u| read_u32(u, "promptTokenCount")),
        completion_tokens: usage.and_then(|u| read_u32(u, "candidatesTokenCount")),
    }
}

fn read_u32(obj: &Value, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_openai_usage() {
        let body = json!({"usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}});
        assert_eq!(
            parse_usage_from_response(&body, "groq"),
            Some(TokenUsage::new(9, 12))
        );
    }

    #[test]
    fn test_anthropic_usage() {
        let body = json!({"usage": {"input_tokens": 25, "output_tokens": 4}});
        assert_eq!(
            parse_usage_from_response(&body, "anthropic"),
            Some(TokenUsage::new(25, 4))
        );
        assert_eq!(parse_usage_from_response(&body, "openai"), None);
    }

    #[test]
    fn test_gemini_usage_metadata_and_openai_fallback() {
        let native = json!({"usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3}});
        assert_eq!(
            parse_usage_from_response(&native, "google"),
            Some(TokenUsage::new(7, 3))
        );

        let compat = json!({"usage": {"prompt_tokens": 5, "completion_tokens": 6}});
        assert_eq!(
            parse_usage_from_response(&compat, "google"),
            Some(TokenUsage::new(5, 6))
        );
    }

    #[test]
    fn test_missing_usage_is_none() {
        assert_eq!(parse_usage_from_response(&json!({"choices": []}), "openai"), None);
        let half = json!({"usage": {"prompt_tokens": 5}});
        assert_eq!(parse_usage_from_response(&half, "openai"), None);
        assert_eq!(
            partial_usage(&half, UsageShape::OpenAi).prompt_tokens,
            Some(5)
        );
    }
}
