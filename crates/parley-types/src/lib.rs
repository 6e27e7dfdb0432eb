//! Shared domain types for Parley.
//!
//! Messages, attachments, token usage, provider configuration, model
//! capabilities, engine configuration, local runner reports, and their
//! error types.
//!
//! Zero infrastructure dependencies -- only serde, secrecy, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod local;
pub mod provider;
