//! `parley chat`: send a conversation, streaming the reply by default.
//!
//! Streaming goes through a [`ChannelHandler`]; Ctrl+C cancels the stream
//! through the engine, which ends it silently.

mod renderer;

use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use console::style;

use parley_core::llm::handler::{ChannelHandler, StreamUpdate};
use parley_types::llm::CompletionResult;

use super::{ConversationArgs, Target};
use crate::state::AppState;

use self::renderer::render_stats_footer;

pub async fn chat(
    state: &AppState,
    target: &Target,
    conversation: &ConversationArgs,
    no_stream: bool,
    conversation_id: Option<String>,
    json: bool,
) -> Result<()> {
    let messages = conversation.messages().await?;
    let started = Instant::now();

    if no_stream {
        let result = state
            .engine
            .get_completion(&target.provider, &target.model, &messages)
            .await?;
        if !json {
            println!();
            println!("  {}", result.content.trim());
        }
        return print_result(&result, started, json);
    }

    let conversation_id = conversation_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let (handler, mut rx) = ChannelHandler::new();
    state.engine.stream_completion(
        &conversation_id,
        &target.provider,
        &target.model,
        &messages,
        handler,
    );
    tracing::debug!(%conversation_id, "stream started");

    if !json {
        println!();
        print!("  ");
        let _ = std::io::stdout().flush();
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(StreamUpdate::Chunk(text)) => {
                    if !json {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                    }
                }
                Some(StreamUpdate::End(result)) => {
                    if !json {
                        println!();
                    }
                    return print_result(&result, started, json);
                }
                Some(StreamUpdate::Error(e)) => {
                    if !json {
                        println!();
                    }
                    return Err(e.into());
                }
                None => {
                    eprintln!("\n  {}", style("Stream cancelled.").dim());
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                state.engine.cancel_stream(&conversation_id);
            }
        }
    }
}

fn print_result(result: &CompletionResult, started: Instant, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    if result.content.is_empty() {
        println!("  {}", style("(empty reply)").dim());
    }
    println!();
    println!(
        "{}",
        render_stats_footer(&result.usage, result.cost, started.elapsed().as_secs_f64())
    );
    println!();
    Ok(())
}
