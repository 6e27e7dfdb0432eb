//! Provider CLI commands: list configured providers, fetch model lists.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_core::settings::SettingsStore;
use parley_types::provider::ModelCapabilities;

use crate::state::AppState;

/// Display configured providers and the models each one exposes.
pub async fn list_providers(state: &AppState, json: bool) -> Result<()> {
    let providers = state.engine.get_available_providers().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    if providers.is_empty() {
        println!();
        println!(
            "  {} No providers configured. Add one to {}.",
            style("i").blue().bold(),
            style(state.data_dir.join("config.toml").display()).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Models").fg(Color::White),
    ]);

    for provider in &providers {
        let models = if provider.models.is_empty() {
            "-".to_string()
        } else {
            provider.models.join(", ")
        };
        table.add_row(vec![
            Cell::new(&provider.id).fg(Color::Cyan),
            Cell::new(&provider.name),
            Cell::new(models),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Fetch a provider's models from its API and show detected capabilities.
pub async fn fetch_models(state: &AppState, provider_id: &str, json: bool) -> Result<()> {
    let models = state.engine.fetch_models_from_provider(provider_id).await?;
    let capabilities = state
        .engine
        .settings()
        .get_provider_config(provider_id)
        .map(|config| config.model_capabilities)
        .unwrap_or_default();

    if json {
        let entries: Vec<serde_json::Value> = models
            .iter()
            .map(|model| {
                serde_json::json!({
                    "id": model,
                    "capabilities": capabilities.get(model),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Model").fg(Color::White),
        Cell::new("Vision").fg(Color::White),
        Cell::new("Audio").fg(Color::White),
        Cell::new("Files").fg(Color::White),
        Cell::new("Context").fg(Color::White),
    ]);

    for model in &models {
        let caps = capabilities.get(model);
        table.add_row(vec![
            Cell::new(model).fg(Color::Cyan),
            flag_cell(caps.map(|c| c.vision)),
            flag_cell(caps.map(|c| c.audio)),
            flag_cell(caps.map(|c| c.files)),
            Cell::new(context_label(caps)),
        ]);
    }

    println!();
    println!(
        "  {} {} model{} from {}",
        style("✓").green().bold(),
        models.len(),
        if models.len() == 1 { "" } else { "s" },
        style(provider_id).cyan()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn flag_cell(flag: Option<bool>) -> Cell {
    match flag {
        Some(true) => Cell::new("yes").fg(Color::Green),
        Some(false) => Cell::new("no").fg(Color::DarkGrey),
        None => Cell::new("?").fg(Color::DarkGrey),
    }
}

fn context_label(caps: Option<&ModelCapabilities>) -> String {
    caps.and_then(|c| c.context_length)
        .map(format_tokens_human)
        .unwrap_or_else(|| "-".to_string())
}

/// `128000` -> `128K`, `2000000` -> `2M`.
pub fn format_tokens_human(tokens: u32) -> String {
    match tokens {
        t if t >= 1_000_000 && t % 1_000_000 == 0 => format!("{}M", t / 1_000_000),
        t if t >= 1_000 && t % 1_000 == 0 => format!("{}K", t / 1_000),
        t => t.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tokens_human() {
        assert_eq!(format_tokens_human(128_000), "128K");
        assert_eq!(format_tokens_human(2_000_000), "2M");
        assert_eq!(format_tokens_human(16_385), "16385");
    }

    #[test]
    fn test_context_label() {
        let caps = ModelCapabilities {
            context_length: Some(200_000),
            ..Default::default()
        };
        assert_eq!(context_label(Some(&caps)), "200K");
        assert_eq!(context_label(None), "-");
    }
}
