//! Observability for Parley: tracing setup and GenAI span conventions.

pub mod genai_attrs;
pub mod tracing_setup;
