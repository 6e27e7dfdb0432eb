//! Infrastructure for Parley: HTTP protocol adapters, the completion
//! engine, pricing, capability detection, local runners, and config loading.

pub mod config;
pub mod llm;
