//! LLM abstractions for Parley.
//!
//! - `ProtocolAdapter`: one implementation per wire-protocol family
//! - `AdapterRegistry`: provider id -> adapter, with a fallback family
//! - `StreamRegistry`: per-conversation cancellation slots
//! - `TokenCounter`: pre-send estimates and usage fallback

pub mod adapter;
pub mod api_error;
pub mod capabilities;
pub mod handler;
pub mod registry;
pub mod stream_registry;
pub mod tokens;
pub mod usage;
