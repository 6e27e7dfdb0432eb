//! Local runner CLI command: install detection and local model discovery.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::local::{ModelDiscovery, RunnerDetection, RunnerStatus};

use crate::state::AppState;

/// Check a local runner and, with `models`, list the models found locally.
pub async fn local(state: &AppState, provider_id: &str, models: bool, json: bool) -> Result<()> {
    let detection = state.engine.detect_local_runner(provider_id).await?;
    let discovery = if models {
        Some(state.engine.discover_local_models().await)
    } else {
        None
    };

    if json {
        let output = serde_json::json!({
            "runner": detection,
            "discovery": discovery,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_detection(&detection);
    if let Some(discovery) = &discovery {
        print_discovery(discovery);
    }
    Ok(())
}

fn print_detection(detection: &RunnerDetection) {
    let marker = match detection.status {
        RunnerStatus::Running => style("✓").green().bold(),
        RunnerStatus::InstalledNotRunning => style("!").yellow().bold(),
        RunnerStatus::NotInstalled => style("✗").red().bold(),
    };
    println!();
    println!(
        "  {marker} {} is {}",
        style(&detection.provider).cyan(),
        detection.status
    );
    if let Some(path) = &detection.binary_path {
        println!("    binary:  {}", path.display());
    }
    if let Some(version) = &detection.version {
        println!("    version: {version}");
    }
    println!();
}

fn print_discovery(discovery: &ModelDiscovery) {
    if discovery.models.is_empty() {
        println!("  {} No local models found.", style("i").blue().bold());
    } else {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Model").fg(Color::White),
            Cell::new("Source").fg(Color::White),
            Cell::new("Format").fg(Color::White),
            Cell::new("Size").fg(Color::White),
        ]);
        for model in &discovery.models {
            table.add_row(vec![
                Cell::new(&model.name).fg(Color::Cyan),
                Cell::new(model.source.to_string()),
                Cell::new(model.format.map_or_else(|| "-".to_string(), |f| f.to_string())),
                Cell::new(format_bytes(model.size_bytes)),
            ]);
        }
        println!("{table}");
        println!(
            "  {} model{}, {} total",
            discovery.total_count(),
            if discovery.total_count() == 1 { "" } else { "s" },
            format_bytes(discovery.total_size_bytes)
        );
    }

    for error in &discovery.errors {
        println!("  {} {error}", style("!").yellow().bold());
    }
    println!();
}

/// Binary units, one decimal place above bytes.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(4_661_224_676), "4.3 GiB");
    }
}
