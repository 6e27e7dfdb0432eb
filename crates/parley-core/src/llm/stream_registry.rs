//! Per-conversation cancellation registry for in-flight streams.
//!
//! Each engine instance owns one registry. A conversation id maps to at most
//! one active slot. Starting a second stream for the same id cancels the
//! first (cancel-and-replace). Every slot carries a generation number so a
//! replaced stream finishing late cannot remove its successor's slot.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct StreamSlot {
    token: CancellationToken,
    generation: u64,
}

/// Handle held by the task driving one stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    conversation_id: String,
    token: CancellationToken,
    generation: u64,
}

impl StreamHandle {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Token the stream task selects on.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry of active streams keyed by conversation id.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    slots: DashMap<String, StreamSlot>,
    next_generation: AtomicU64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `conversation_id`, cancelling any stream already there.
    pub fn register(&self, conversation_id: &str) -> StreamHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.slots.insert(
            conversation_id.to_string(),
            StreamSlot {
                token: token.clone(),
                generation,
            },
        );

        if let Some(previous) = previous {
            tracing::debug!(
                conversation_id,
                replaced_generation = previous.generation,
                "replacing active stream"
            );
            previous.token.cancel();
        }

        StreamHandle {
            conversation_id: conversation_id.to_string(),
            token,
            generation,
        }
    }

    /// Abort the active stream for `conversation_id`.
    ///
    /// Returns `true` iff a stream was active. A second call returns `false`.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.slots.remove(conversation_id) {
            Some((_, slot)) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Release the slot owned by `handle`, if it still owns it.
    ///
    /// Called on every terminal outcome. Returns whether a slot was removed.
    pub fn finish(&self, handle: &StreamHandle) -> bool {
        self.slots
            .remove_if(&handle.conversation_id, |_, slot| {
                slot.generation == handle.generation
            })
            .is_some()
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.slots.contains_key(conversation_id)
    }

    /// Number of active streams.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_twice_returns_true_then_false() {
        let registry = StreamRegistry::new();
        let handle = registry.register("conv-1");

        assert!(registry.cancel("conv-1"));
        assert!(handle.is_cancelled());
        assert!(!registry.cancel("conv-1"));
    }

    #[test]
    fn test_cancel_unknown_id_is_false() {
        let registry = StreamRegistry::new();
        assert!(!registry.cancel("missing"));
    }

    #[test]
    fn test_streams_are_independent() {
        let registry = StreamRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");

        assert!(registry.cancel("a"));
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(registry.is_active("b"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces_and_cancels_previous() {
        let registry = StreamRegistry::new();
        let first = registry.register("conv");
        let second = registry.register("conv");

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_ne!(first.generation(), second.generation());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_finish_keeps_successor_slot() {
        let registry = StreamRegistry::new();
        let first = registry.register("conv");
        let second = registry.register("conv");

        assert!(!registry.finish(&first));
        assert!(registry.is_active("conv"));

        assert!(registry.finish(&second));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finish_after_cancel_is_noop() {
        let registry = StreamRegistry::new();
        let handle = registry.register("conv");
        registry.cancel("conv");
        assert!(!registry.finish(&handle));
    }
}
