//! Anthropic Messages API protocol adapter.
//!
//! Requests go to `{endpoint}/messages` with `x-api-key` and
//! `anthropic-version` headers. System messages are lifted into the
//! top-level `system` field. The stream protocol:
//! 1. `message_start` -- message object with input usage
//! 2. Per block: `content_block_start` -> N x `content_block_delta` -> `content_block_stop`
//! 3. `message_delta` -- cumulative output usage
//! 4. `message_stop` -- final event
//! 5. `ping` events may appear anywhere (keepalive)
//! 6. `error` events may appear mid-stream

pub mod types;

use secrecy::ExposeSecret;
use serde_json::Value;

use parley_core::llm::adapter::{ChatRequest, HttpRequest, ParsedResponse, ProtocolAdapter};
use parley_core::llm::api_error::stream_error;
use parley_core::llm::usage::{UsageShape, partial_usage};
use parley_types::llm::{
    LlmError, Message, MessageRole, PartialUsage, StreamEvent, TokenUsage,
};
use parley_types::provider::ProviderConfig;

use super::openai_compat::log_dropped_attachments;
use super::openai_compat::types::ModelList;
use self::types::{
    AnthropicContent, AnthropicContentBlock, AnthropicDelta, AnthropicMessage,
    AnthropicNonStreamResponse, AnthropicRequest, AnthropicRequestBlock, AnthropicUsage,
    ContentBlockDeltaPayload, ImageSource, MessageDeltaPayload, MessageStartPayload,
};

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone, Copy)]
pub struct AnthropicAdapter {
    max_tokens: u32,
}

impl AnthropicAdapter {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    /// `max_tokens` is required by the API; it comes from engine config.
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    fn with_headers(request: HttpRequest, config: &ProviderConfig) -> HttpRequest {
        let request = request.header("anthropic-version", Self::API_VERSION);
        match &config.api_key {
            Some(key) => request.header("x-api-key", key.expose_secret()),
            None => request,
        }
    }

    fn to_anthropic_request(&self, request: &ChatRequest<'_>) -> AnthropicRequest {
        let (system, messages) = split_system(request.messages);
        AnthropicRequest {
            model: request.model.to_string(),
            max_tokens: self.max_tokens,
            messages,
            system,
            stream: request.stream,
        }
    }
}

/// Lift system messages out of the conversation. Several system messages
/// are joined with blank lines.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));

    let conversation = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|msg| {
            log_dropped_attachments(msg);
            let images: Vec<_> = msg.images().collect();
            let content = if msg.role == MessageRole::User && !images.is_empty() {
                let mut blocks: Vec<AnthropicRequestBlock> = images
                    .into_iter()
                    .map(|image| AnthropicRequestBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: image.mime_type.clone(),
                            data: image.data.clone(),
                        },
                    })
                    .collect();
                if !msg.content.is_empty() {
                    blocks.push(AnthropicRequestBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                AnthropicContent::Blocks(blocks)
            } else {
                AnthropicContent::Text(msg.content.clone())
            };
            AnthropicMessage {
                role: msg.role.to_string(),
                content,
            }
        })
        .collect();

    (system, conversation)
}

fn to_partial(usage: AnthropicUsage) -> PartialUsage {
    PartialUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    provider: &str,
    event_type: &str,
    data: &str,
) -> Result<T, LlmError> {
    serde_json::from_str(data)
        .map_err(|e| LlmError::InvalidResponse(format!("{provider}: {event_type}: {e}")))
}

impl ProtocolAdapter for AnthropicAdapter {
    fn family(&self) -> &'static str {
        "anthropic"
    }

    fn build_request(&self, request: &ChatRequest<'_>) -> Result<HttpRequest, LlmError> {
        let body = serde_json::to_value(self.to_anthropic_request(request))
            .map_err(|e| LlmError::Configuration(format!("failed to encode request: {e}")))?;
        let url = format!("{}/messages", request.config.base_url());
        Ok(Self::with_headers(HttpRequest::post(url, body), request.config))
    }

    fn parse_stream_event(
        &self,
        provider: &str,
        event: &str,
        data: &str,
    ) -> Result<Vec<StreamEvent>, LlmError> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = decode(provider, event, data)?;
        // Proxies sometimes drop the `event:` line; the payload repeats it.
        let event_type = match event {
            "" | "message" => value.get("type").and_then(Value::as_str).unwrap_or(""),
            named => named,
        };

        let mut events = Vec::new();
        match event_type {
            "message_start" => {
                let payload: MessageStartPayload = decode(provider, event_type, data)?;
                if let Some(usage) = payload.message.usage {
                    events.push(StreamEvent::Usage(to_partial(usage)));
                }
            }
            "content_block_delta" => {
                let payload: ContentBlockDeltaPayload = decode(provider, event_type, data)?;
                match payload.delta {
                    AnthropicDelta::TextDelta { text } if !text.is_empty() => {
                        events.push(StreamEvent::TextDelta(text));
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                let payload: MessageDeltaPayload = decode(provider, event_type, data)?;
                if let Some(usage) = payload.usage {
                    events.push(StreamEvent::Usage(to_partial(usage)));
                }
            }
            "message_stop" => events.push(StreamEvent::Done),
            "ping" | "content_block_start" | "content_block_stop" => {}
            "error" => return Err(stream_error(provider, &value)),
            other => {
                tracing::debug!(event = other, "ignoring unknown anthropic stream event");
            }
        }
        Ok(events)
    }

    fn parse_response(&self, provider: &str, body: &Value) -> Result<ParsedResponse, LlmError> {
        let response: AnthropicNonStreamResponse = serde_json::from_value(body.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("{provider}: {e}")))?;
        let content = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(ParsedResponse {
            content,
            usage: self.parse_usage(body),
        })
    }

    fn parse_usage(&self, body: &Value) -> Option<TokenUsage> {
        let usage = partial_usage(body, UsageShape::Anthropic);
        Some(TokenUsage::new(usage.prompt_tokens?, usage.completion_tokens?))
    }

    fn build_models_request(&self, config: &ProviderConfig) -> HttpRequest {
        let url = format!("{}/models", config.base_url());
        Self::with_headers(HttpRequest::get(url), config)
    }

    fn parse_models(&self, body: &Value) -> Result<Vec<String>, LlmError> {
        let list: ModelList = serde_json::from_value(body.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}
