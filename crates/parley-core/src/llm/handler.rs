//! Callbacks for streamed completions.
//!
//! `on_chunk` fires zero or more times in arrival order, then exactly one of
//! `on_error` / `on_end`. A cancelled stream fires neither terminal callback.

use tokio::sync::mpsc;

use parley_types::llm::{CompletionResult, LlmError};

/// Receiver of one stream's events. Called from the stream's task.
pub trait StreamHandler: Send + Sync + 'static {
    fn on_chunk(&self, text: &str);

    fn on_error(&self, error: LlmError);

    fn on_end(&self, result: CompletionResult);
}

/// One stream callback, as delivered by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Chunk(String),
    Error(LlmError),
    End(CompletionResult),
}

impl StreamUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamUpdate::Error(_) | StreamUpdate::End(_))
    }
}

/// Handler that forwards callbacks into an unbounded channel.
///
/// The receiver yields `None` once the stream task drops the handler, which
/// is how a consumer observes a silent cancellation.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<StreamUpdate>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: StreamUpdate) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(update);
    }
}

impl StreamHandler for ChannelHandler {
    fn on_chunk(&self, text: &str) {
        self.send(StreamUpdate::Chunk(text.to_string()));
    }

    fn on_error(&self, error: LlmError) {
        self.send(StreamUpdate::Error(error));
    }

    fn on_end(&self, result: CompletionResult) {
        self.send(StreamUpdate::End(result));
    }
}

#[cfg(test)]
mod tests {
    use parley_types::llm::TokenUsage;

    use super::*;

    #[tokio::test]
    async fn test_channel_handler_forwards_in_order() {
        let (handler, mut rx) = ChannelHandler::new();
        handler.on_chunk("Hel");
        handler.on_chunk("lo");
        handler.on_end(CompletionResult {
            content: "Hello".to_string(),
            usage: TokenUsage::new(8, 1),
            cost: None,
        });
        drop(handler);

        assert_eq!(rx.recv().await, Some(StreamUpdate::Chunk("Hel".to_string())));
        assert_eq!(rx.recv().await, Some(StreamUpdate::Chunk("lo".to_string())));
        let end = rx.recv().await.unwrap();
        assert!(end.is_terminal());
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (handler, rx) = ChannelHandler::new();
        drop(rx);
        handler.on_error(LlmError::Transport("reset".to_string()));
    }
}
