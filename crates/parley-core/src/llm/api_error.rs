//! Human-readable messages for failed provider HTTP calls.
//!
//! Two stages: a status template that always names the provider, then
//! enrichment from whatever the body carries. Every non-2xx response
//! passes through [`parse_api_error`] before reaching a caller.

use serde_json::Value;

use parley_types::llm::LlmError;

/// Longest raw body excerpt appended to a message, in characters.
const RAW_BODY_LIMIT: usize = 200;

/// Build the caller-facing message for a non-2xx response.
pub fn parse_api_error(status: u16, body: &str, provider_name: &str) -> String {
    let base = status_template(status, provider_name);
    match extract_detail(body) {
        Some(detail) => format!("{base}. Details: {detail}"),
        None => base,
    }
}

/// Wrap a non-2xx response as [`LlmError::Provider`].
pub fn provider_error(status: u16, body: &str, provider_name: &str) -> LlmError {
    LlmError::Provider {
        provider: provider_name.to_string(),
        status,
        message: parse_api_error(status, body, provider_name),
    }
}

/// Wrap an error reported inside an otherwise successful stream.
///
/// `payload` is the decoded error frame; its detail is extracted with the
/// same field priority as [`parse_api_error`].
pub fn stream_error(provider_name: &str, payload: &Value) -> LlmError {
    let detail = detail_from_json(payload).unwrap_or_else(|| truncate(&payload.to_string()));
    LlmError::Provider {
        provider: provider_name.to_string(),
        status: 0,
        message: format!("{provider_name}: Stream error - {detail}"),
    }
}

fn status_template(status: u16, provider: &str) -> String {
    match status {
        401 => format!("{provider}: Unauthorized - check your API key"),
        403 => format!("{provider}: Forbidden - the API key lacks access to this resource"),
        404 => format!("{provider}: Not Found - check the endpoint URL and model name"),
        429 => format!("{provider}: Rate limit exceeded - wait a moment and try again"),
        500..=599 => format!("{provider}: Server error ({status}) - try again later"),
        _ => format!("{provider}: Request failed with status {status}"),
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => detail_from_json(&json).or_else(|| Some(truncate(trimmed))),
        Err(_) => Some(truncate(trimmed)),
    }
}

fn detail_from_json(json: &Value) -> Option<String> {
    let error = json.get("error");

    if let Some(message) = error.and_then(|e| e.get("message")).and_then(non_empty_str) {
        return Some(message.to_string());
    }

    if let Some(code) = error.and_then(|e| e.get("code")).and_then(scalar_to_string) {
        return Some(match json.get("message").and_then(non_empty_str) {
            Some(message) => format!("{code}: {message}"),
            None => code,
        });
    }

    if let Some(message) = json.get("message").and_then(non_empty_str) {
        return Some(message.to_string());
    }

    if let Some(detail) = json.get("detail") {
        return match detail {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null => None,
            other => Some(truncate(&other.to_string())),
        };
    }

    // Some servers (Ollama, llama.cpp) send `{"error": "..."}`.
    error.and_then(non_empty_str).map(str::to_string)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= RAW_BODY_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(RAW_BODY_LIMIT).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_names_provider() {
        let msg = parse_api_error(401, "", "OpenAI");
        assert!(msg.contains("OpenAI"));
        assert!(msg.contains("Unauthorized"));
    }

    #[test]
    fn test_status_templates() {
        assert!(parse_api_error(403, "", "x").contains("Forbidden"));
        assert!(parse_api_error(404, "", "x").contains("Not Found"));
        assert!(parse_api_error(429, "", "x").contains("Rate limit"));
        assert!(parse_api_error(503, "", "x").contains("Server error (503)"));
        assert!(parse_api_error(418, "", "x").contains("status 418"));
    }

    #[test]
    fn test_error_message_wins() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"},"message":"ignored"}"#;
        let msg = parse_api_error(401, body, "openai");
        assert!(msg.ends_with("Details: Incorrect API key provided"));
    }

    #[test]
    fn test_error_code_with_top_level_message() {
        let body = r#"{"error":{"code":429},"message":"slow down"}"#;
        let msg = parse_api_error(429, body, "groq");
        assert!(msg.ends_with("Details: 429: slow down"));
    }

    #[test]
    fn test_top_level_message_then_detail() {
        let msg = parse_api_error(400, r#"{"message":"bad model"}"#, "xai");
        assert!(msg.ends_with("Details: bad model"));

        let msg = parse_api_error(422, r#"{"detail":"field required"}"#, "vllm");
        assert!(msg.ends_with("Details: field required"));
    }

    #[test]
    fn test_plain_string_error_field() {
        let msg = parse_api_error(404, r#"{"error":"model 'llama9' not found"}"#, "ollama");
        assert!(msg.ends_with("Details: model 'llama9' not found"));
    }

    #[test]
    fn test_raw_body_is_truncated() {
        let body = "x".repeat(500);
        let msg = parse_api_error(502, &body, "together");
        let detail = msg.split("Details: ").nth(1).unwrap();
        assert_eq!(detail.chars().count(), RAW_BODY_LIMIT + 3);
        assert!(detail.ends_with("..."));
    }

    #[test]
    fn test_stream_error_uses_error_message() {
        let payload = serde_json::json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}});
        let err = stream_error("anthropic", &payload);
        assert_eq!(err.to_string(), "anthropic: Stream error - Overloaded");
    }

    #[test]
    fn test_provider_error_carries_status() {
        let err = provider_error(401, "", "anthropic");
        match err {
            LlmError::Provider {
                provider, status, ..
            } => {
                assert_eq!(provider, "anthropic");
                assert_eq!(status, 401);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
