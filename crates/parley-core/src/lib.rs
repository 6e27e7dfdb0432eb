//! Protocol-agnostic engine logic and port definitions for Parley.
//!
//! This crate defines the "ports" (adapter and settings traits) that the
//! infrastructure layer implements, plus the pure pieces of the engine:
//! token counting, error normalization, capability merging, and the stream
//! registry. It depends only on `parley-types` -- never on `parley-infra`
//! or any HTTP crate.

pub mod llm;
pub mod settings;
