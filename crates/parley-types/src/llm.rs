//! LLM request/response types for Parley.
//!
//! These types model the data shapes shared by every protocol adapter:
//! chat messages and their attachments, normalized token usage, the
//! completion result handed back to callers, and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// Kind of binary payload attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    File,
}

/// A base64-encoded attachment carried alongside a message.
///
/// Only images are forwarded to providers today; audio and file
/// attachments are accepted but dropped when requests are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Base64 payload without a `data:` prefix.
    pub data: String,
    pub mime_type: String,
    pub name: String,
}

impl Attachment {
    /// Render the attachment as a `data:` URL (OpenAI `image_url` form).
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Image attachments only; the subset providers actually receive.
    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Image)
    }
}

/// Normalized token usage for one completion.
///
/// `total_tokens` is always `prompt_tokens + completion_tokens`; use
/// [`TokenUsage::new`] rather than building the struct by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Usage numbers as reported mid-stream. Either side may be missing;
/// Anthropic reports input tokens in `message_start` and output tokens
/// in `message_delta`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl PartialUsage {
    /// Overlay `other` on top of `self`, keeping existing values where
    /// `other` has none.
    pub fn merge(&mut self, other: PartialUsage) {
        if other.prompt_tokens.is_some() {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens.is_some() {
            self.completion_tokens = other.completion_tokens;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none()
    }
}

impl From<TokenUsage> for PartialUsage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt_tokens: Some(usage.prompt_tokens),
            completion_tokens: Some(usage.completion_tokens),
        }
    }
}

/// Result of a finished completion, streamed or batched.
///
/// `cost` is `None` when pricing for the provider/model pair is unknown.
/// Callers must not read that as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    pub usage: TokenUsage,
    pub cost: Option<f64>,
}

/// Pre-send estimate of what a conversation will cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageEstimate {
    pub usage: TokenUsage,
    pub cost: Option<f64>,
}

/// Event produced by a protocol adapter while decoding a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// Provider-reported usage (possibly partial).
    Usage(PartialUsage),
    /// Terminal marker (`[DONE]`, `message_stop`).
    Done,
}

/// Errors from LLM engine operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// The provider is unknown or not configured. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response, or an error event inside a stream (`status` 0).
    /// `message` is already human-readable.
    #[error("{message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    /// Network failure or stream inactivity timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered 2xx with a payload we could not decode.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A local runner could not be reached or started.
    #[error("{0}")]
    LocalRunner(String),

    /// The stream was cancelled by the caller. Never surfaced to handlers.
    #[error("stream cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether this error is the silent cancellation marker.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LlmError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_token_usage_total_is_sum() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_partial_usage_merge_keeps_existing_side() {
        let mut usage = PartialUsage {
            prompt_tokens: Some(25),
            completion_tokens: None,
        };
        usage.merge(PartialUsage {
            prompt_tokens: None,
            completion_tokens: Some(7),
        });
        assert_eq!(usage.prompt_tokens, Some(25));
        assert_eq!(usage.completion_tokens, Some(7));
    }

    #[test]
    fn test_message_without_attachments_omits_field() {
        let json = serde_json::to_value(Message::user("Hi")).unwrap();
        assert!(json.get("attachments").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_images_filters_other_attachment_kinds() {
        let msg = Message::user("look")
            .with_attachment(Attachment {
                kind: AttachmentKind::Image,
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
                name: "a.png".to_string(),
            })
            .with_attachment(Attachment {
                kind: AttachmentKind::Audio,
                data: "aGk=".to_string(),
                mime_type: "audio/wav".to_string(),
                name: "a.wav".to_string(),
            });
        let images: Vec<_> = msg.images().collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data_url(), "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_provider_error_display_is_message() {
        let err = LlmError::Provider {
            provider: "openai".to_string(),
            status: 401,
            message: "openai: Unauthorized - check your API key".to_string(),
        };
        assert_eq!(err.to_string(), "openai: Unauthorized - check your API key");
        assert!(!err.is_cancellation());
        assert!(LlmError::Cancelled.is_cancellation());
    }
}
