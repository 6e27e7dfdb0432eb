//! `parley estimate`: token and cost estimate before sending.

use anyhow::Result;
use console::style;

use parley_infra::llm::pricing::format_cost;

use super::{ConversationArgs, Target};
use crate::state::AppState;

pub async fn estimate(
    state: &AppState,
    target: &Target,
    conversation: &ConversationArgs,
    json: bool,
) -> Result<()> {
    let messages = conversation.messages().await?;
    let estimate =
        state
            .engine
            .calculate_usage_for_messages(&target.provider, &target.model, &messages);

    if json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
        return Ok(());
    }

    let cost = estimate
        .cost
        .map(format_cost)
        .unwrap_or_else(|| "unknown".to_string());
    println!();
    println!(
        "  {} {} / {}",
        style("Estimate").bold(),
        style(&target.provider).cyan(),
        style(&target.model).cyan()
    );
    println!("  prompt:     {}", estimate.usage.prompt_tokens);
    println!("  completion: {}", estimate.usage.completion_tokens);
    println!("  total:      {}", estimate.usage.total_tokens);
    println!("  cost:       {}", style(cost).yellow());
    println!();
    Ok(())
}
