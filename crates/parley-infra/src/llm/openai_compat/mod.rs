//! OpenAI-compatible protocol adapter.
//!
//! A single [`OpenAiCompatAdapter`] serves OpenAI, Groq, OpenRouter, xAI,
//! DeepInfra, Fireworks, Together, local runners (Ollama, vLLM, llama.cpp),
//! custom endpoints, and Google Gemini's OpenAI-compatible endpoint. The
//! Gemini variant differs only in the usage shape it accepts.
//!
//! The API key is only exposed when building the `Authorization` header.

pub mod types;

use secrecy::ExposeSecret;
use serde_json::Value;

use parley_core::llm::adapter::{ChatRequest, HttpRequest, ParsedResponse, ProtocolAdapter};
use parley_core::llm::api_error::stream_error;
use parley_core::llm::usage::{UsageShape, partial_usage};
use parley_types::llm::{AttachmentKind, LlmError, Message, MessageRole, StreamEvent, TokenUsage};
use parley_types::provider::ProviderConfig;

use super::defaults::supports_stream_usage;
use self::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ImageUrl, ModelList,
    OpenAiContent, OpenAiContentPart, OpenAiMessage, StreamOptions,
};

/// Adapter for the OpenAI chat completions protocol.
#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatAdapter {
    family: &'static str,
    usage_shape: UsageShape,
}

impl OpenAiCompatAdapter {
    pub fn new() -> Self {
        Self {
            family: "openai_compat",
            usage_shape: UsageShape::OpenAi,
        }
    }

    /// Gemini through `.../v1beta/openai`. Usage may arrive in Gemini's
    /// native `promptTokenCount` / `candidatesTokenCount` shape.
    pub fn gemini() -> Self {
        Self {
            family: "gemini",
            usage_shape: UsageShape::Gemini,
        }
    }

    fn with_auth(request: HttpRequest, config: &ProviderConfig) -> HttpRequest {
        match &config.api_key {
            Some(key) => request.header(
                "Authorization",
                format!("Bearer {}", key.expose_secret()),
            ),
            None => request,
        }
    }
}

impl Default for OpenAiCompatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert messages to the OpenAI shape. Images on user messages become
/// `image_url` parts with data URLs; other attachment kinds are dropped.
pub fn to_openai_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    messages
        .iter()
        .map(|msg| {
            log_dropped_attachments(msg);
            let images: Vec<_> = msg.images().collect();
            let content = if msg.role == MessageRole::User && !images.is_empty() {
                let mut parts = Vec::with_capacity(images.len() + 1);
                if !msg.content.is_empty() {
                    parts.push(OpenAiContentPart::Text {
                        text: msg.content.clone(),
                    });
                }
                parts.extend(images.into_iter().map(|image| OpenAiContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                }));
                OpenAiContent::Parts(parts)
            } else {
                OpenAiContent::Text(msg.content.clone())
            };
            OpenAiMessage {
                role: msg.role.to_string(),
                content,
            }
        })
        .collect()
}

pub(crate) fn log_dropped_attachments(msg: &Message) {
    for attachment in &msg.attachments {
        let forwarded = attachment.kind == AttachmentKind::Image && msg.role == MessageRole::User;
        if !forwarded {
            tracing::debug!(
                name = %attachment.name,
                kind = ?attachment.kind,
                role = %msg.role,
                "attachment not forwarded to provider"
            );
        }
    }
}

impl ProtocolAdapter for OpenAiCompatAdapter {
    fn family(&self) -> &'static str {
        self.family
    }

    fn build_request(&self, request: &ChatRequest<'_>) -> Result<HttpRequest, LlmError> {
        let stream_options = (request.stream && supports_stream_usage(&request.config.id))
            .then_some(StreamOptions {
                include_usage: true,
            });

        let body = ChatCompletionRequest {
            model: request.model.to_string(),
            messages: to_openai_messages(request.messages),
            stream: request.stream,
            stream_options,
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| LlmError::Configuration(format!("failed to encode request: {e}")))?;

        let url = format!("{}/chat/completions", request.config.base_url());
        Ok(Self::with_auth(HttpRequest::post(url, body), request.config))
    }

    fn parse_stream_event(
        &self,
        provider: &str,
        _event: &str,
        data: &str,
    ) -> Result<Vec<StreamEvent>, LlmError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }

        let value: Value = serde_json::from_str(data).map_err(|e| {
            LlmError::InvalidResponse(format!("{provider}: malformed stream frame: {e}"))
        })?;
        if value.get("error").is_some_and(|e| !e.is_null()) {
            return Err(stream_error(provider, &value));
        }

        let mut events = Vec::new();
        let usage = partial_usage(&value, self.usage_shape);

        let chunk: ChatCompletionChunk = serde_json::from_value(value).map_err(|e| {
            LlmError::InvalidResponse(format!("{provider}: unexpected stream chunk: {e}"))
        })?;
        if let Some(text) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
        {
            events.push(StreamEvent::TextDelta(text));
        }
        if !usage.is_empty() {
            events.push(StreamEvent::Usage(usage));
        }
        Ok(events)
    }

    fn parse_response(&self, provider: &str, body: &Value) -> Result<ParsedResponse, LlmError> {
        let response: ChatCompletionResponse = serde_json::from_value(body.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("{provider}: {e}")))?;
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse(format!("{provider}: response contained no choices"))
        })?;

        Ok(ParsedResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: self.parse_usage(body),
        })
    }

    fn parse_usage(&self, body: &Value) -> Option<TokenUsage> {
        let usage = partial_usage(body, self.usage_shape);
        Some(TokenUsage::new(usage.prompt_tokens?, usage.completion_tokens?))
    }

    fn build_models_request(&self, config: &ProviderConfig) -> HttpRequest {
        let url = format!("{}/models", config.base_url());
        Self::with_auth(HttpRequest::get(url), config)
    }

    fn parse_models(&self, body: &Value) -> Result<Vec<String>, LlmError> {
        let list: ModelList = serde_json::from_value(body.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("model list: {e}")))?;
        let mut ids: Vec<String> = list
            .data
            .into_iter()
            // Gemini lists ids as `models/gemini-1.5-pro`.
            .map(|m| m.id.strip_prefix("models/").map(str::to_string).unwrap_or(m.id))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use parley_types::llm::Attachment;
    use parley_types::llm::PartialUsage;

    use super::*;

    fn config(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            endpoint: "https://api.example.com/v1/".to_string(),
            api_key: Some(SecretString::from("sk-test")),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_shape() {
        let config = config("openai");
        let messages = vec![Message::system("Be brief."), Message::user("Hi")];
        let request = OpenAiCompatAdapter::new()
            .build_request(&ChatRequest {
                config: &config,
                model: "gpt-4",
                messages: &messages,
                stream: true,
            })
            .unwrap();

        assert_eq!(request.url, "https://api.example.com/v1/chat/completions");
        assert_eq!(request.header_value("authorization"), Some("Bearer sk-test"));
        let body = request.body.unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
    }

    #[test]
    fn test_custom_provider_gets_no_stream_options_or_auth() {
        let config = ProviderConfig {
            id: "my-proxy".to_string(),
            endpoint: "http://localhost:9000/v1".to_string(),
            is_local: true,
            ..Default::default()
        };
        let messages = vec![Message::user("Hi")];
        let request = OpenAiCompatAdapter::new()
            .build_request(&ChatRequest {
                config: &config,
                model: "m",
                messages: &messages,
                stream: true,
            })
            .unwrap();

        assert!(request.header_value("authorization").is_none());
        assert!(request.body.unwrap().get("stream_options").is_none());
    }

    #[test]
    fn test_images_become_data_url_parts() {
        let messages = vec![Message::user("what is this?").with_attachment(Attachment {
            kind: AttachmentKind::Image,
            data: "aGk=".to_string(),
            mime_type: "image/jpeg".to_string(),
            name: "cat.jpg".to_string(),
        })];
        let json = serde_json::to_value(to_openai_messages(&messages)).unwrap();
        let parts = json[0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,aGk=");
    }

    #[test]
    fn test_parse_text_delta_and_done() {
        let adapter = OpenAiCompatAdapter::new();
        let events = adapter
            .parse_stream_event("openai", "message", r#"{"choices":[{"delta":{"content":"Hello"}}]}"#)
            .unwrap();
        assert_eq!(events, vec![StreamEvent::TextDelta("Hello".to_string())]);

        let events = adapter.parse_stream_event("openai", "message", "[DONE]").unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_parse_final_usage_chunk() {
        let adapter = OpenAiCompatAdapter::new();
        let events = adapter
            .parse_stream_event(
                "openai",
                "message",
                r#"{"choices":[],"usage":{"prompt_tokens":8,"completion_tokens":1,"total_tokens":9}}"#,
            )
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Usage(PartialUsage {
                prompt_tokens: Some(8),
                completion_tokens: Some(1),
            })]
        );
    }

    #[test]
    fn test_error_frame_is_provider_error() {
        let err = OpenAiCompatAdapter::new()
            .parse_stream_event("openrouter", "message", r#"{"error":{"message":"upstream timeout"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("openrouter"));
        assert!(err.to_string().contains("upstream timeout"));
    }

    #[test]
    fn test_malformed_frame_is_invalid_response() {
        let err = OpenAiCompatAdapter::new()
            .parse_stream_event("groq", "message", r#"{"choices":[{"delta""#)
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_response_with_usage() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let parsed = OpenAiCompatAdapter::new().parse_response("openai", &body).unwrap();
        assert_eq!(parsed.content, "Hello there");
        assert_eq!(parsed.usage, Some(TokenUsage::new(10, 2)));
    }

    #[test]
    fn test_gemini_accepts_native_usage() {
        let body = json!({
            "choices": [{"message": {"content": "Hi"}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1}
        });
        let parsed = OpenAiCompatAdapter::gemini().parse_response("google", &body).unwrap();
        assert_eq!(parsed.usage, Some(TokenUsage::new(4, 1)));
    }

    #[test]
    fn test_parse_models_strips_prefix_and_sorts() {
        let body = json!({"data": [{"id": "models/gemini-1.5-pro"}, {"id": "gemini-1.5-flash"}]});
        let models = OpenAiCompatAdapter::gemini().parse_models(&body).unwrap();
        assert_eq!(models, vec!["gemini-1.5-flash", "gemini-1.5-pro"]);
    }
}
