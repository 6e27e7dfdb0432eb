//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. Every command goes through
//! the completion engine the same way a UI would.

pub mod chat;
pub mod estimate;
pub mod local;
pub mod provider;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use parley_types::llm::Message;

/// Talk to LLM providers from the terminal.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured providers and their visible models.
    #[command(alias = "ls")]
    Providers,

    /// Fetch a provider's model list and refresh capabilities.
    Models {
        /// Provider id (e.g., "openai", "ollama").
        provider: String,
    },

    /// Check a local runner install and list models available on this machine.
    Local {
        /// Local provider id (e.g., "ollama", "vllm", "llamacpp").
        #[arg(default_value = "ollama")]
        provider: String,

        /// Also list models found in Ollama and LM Studio stores.
        #[arg(long)]
        models: bool,
    },

    /// Estimate tokens and cost of a conversation without sending it.
    Estimate {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        conversation: ConversationArgs,
    },

    /// Send a conversation and print the reply.
    Chat {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        conversation: ConversationArgs,

        /// Wait for the full reply instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// Conversation id for the stream (defaults to a fresh UUIDv7).
        #[arg(long)]
        conversation_id: Option<String>,
    },
}

/// Provider and model to address.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Provider id (e.g., "openai", "anthropic").
    #[arg(short, long)]
    pub provider: String,

    /// Model id (e.g., "gpt-4o").
    #[arg(short, long)]
    pub model: String,
}

/// The messages to send: optional history file, system prompt, and prompt.
#[derive(Args, Debug, Clone)]
pub struct ConversationArgs {
    /// The user message.
    pub prompt: String,

    /// System prompt placed before everything else.
    #[arg(long)]
    pub system: Option<String>,

    /// JSON file with earlier messages: `[{"role": "user", "content": "..."}]`.
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,
}

impl ConversationArgs {
    /// System prompt, then history, then the prompt as a user message.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        if let Some(path) = &self.history {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            messages.extend(parse_history(&raw).with_context(|| {
                format!("{} is not a JSON array of messages", path.display())
            })?);
        }
        messages.push(Message::user(self.prompt.clone()));
        Ok(messages)
    }
}

fn parse_history(raw: &str) -> Result<Vec<Message>, serde_json::Error> {
    serde_json::from_str(raw)
}
