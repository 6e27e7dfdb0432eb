//! ProtocolAdapter trait definition.
//!
//! One adapter per wire-protocol family. Adapters are pure: they turn a
//! request into an [`HttpRequest`] description and decode provider payloads
//! into [`StreamEvent`]s and usage. Network IO, retries, and the stream
//! lifecycle belong to the engine in parley-infra.

use std::fmt;

use serde_json::Value;

use parley_types::llm::{LlmError, Message, StreamEvent, TokenUsage};
use parley_types::provider::ProviderConfig;

/// Everything an adapter needs to build one chat request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub config: &'a ProviderConfig,
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
}

/// HTTP method of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Description of an HTTP request; the engine performs it.
///
/// Header values may carry credentials, so `Debug` lists header names only.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Value of the first header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| *n).collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &names)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Decoded non-streaming response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub content: String,
    /// `None` when the provider omitted usage; the engine estimates instead.
    pub usage: Option<TokenUsage>,
}

/// Trait for wire-protocol families (OpenAI-compatible, Anthropic, Gemini).
///
/// Object-safe so the registry can hold `Arc<dyn ProtocolAdapter>`.
/// Implementations live in parley-infra.
pub trait ProtocolAdapter: Send + Sync {
    /// Family name used in logs and spans (e.g. "openai_compat").
    fn family(&self) -> &'static str;

    /// Build the chat request for `{endpoint}` plus the family's path suffix.
    fn build_request(&self, request: &ChatRequest<'_>) -> Result<HttpRequest, LlmError>;

    /// Decode one SSE event. `event` is the SSE event name ("message" when
    /// the frame had none); `data` is the joined `data:` payload.
    /// `provider` names the provider in errors reported inside the stream.
    ///
    /// Returns zero or more events; unknown or keep-alive frames yield none.
    fn parse_stream_event(
        &self,
        provider: &str,
        event: &str,
        data: &str,
    ) -> Result<Vec<StreamEvent>, LlmError>;

    /// Decode a full non-streaming response body.
    fn parse_response(&self, provider: &str, body: &Value) -> Result<ParsedResponse, LlmError>;

    /// Extract provider-reported usage from a response body, if present.
    fn parse_usage(&self, body: &Value) -> Option<TokenUsage>;

    /// Request listing the models the provider serves.
    fn build_models_request(&self, config: &ProviderConfig) -> HttpRequest;

    /// Decode the model listing into model ids.
    fn parse_models(&self, body: &Value) -> Result<Vec<String>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_header_values() {
        let request = HttpRequest::post("https://api.example.com/v1/chat/completions", Value::Null)
            .header("Authorization", "Bearer sk-secret");
        let debug = format!("{request:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_header_value_is_case_insensitive() {
        let request = HttpRequest::get("http://localhost/models").header("x-api-key", "k");
        assert_eq!(request.header_value("X-API-KEY"), Some("k"));
        assert_eq!(request.header_value("authorization"), None);
    }
}
