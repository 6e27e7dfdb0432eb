//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use parley_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley_infra=debug",
        _ => "trace",
    };
    init_tracing(&TracingOptions {
        default_filter: filter.to_string(),
        json: cli.json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await;

    let result = match cli.command {
        Commands::Providers => cli::provider::list_providers(&state, cli.json).await,
        Commands::Models { provider } => {
            cli::provider::fetch_models(&state, &provider, cli.json).await
        }
        Commands::Local { provider, models } => {
            cli::local::local(&state, &provider, models, cli.json).await
        }
        Commands::Estimate {
            target,
            conversation,
        } => cli::estimate::estimate(&state, &target, &conversation, cli.json).await,
        Commands::Chat {
            target,
            conversation,
            no_stream,
            conversation_id,
        } => {
            cli::chat::chat(
                &state,
                &target,
                &conversation,
                no_stream,
                conversation_id,
                cli.json,
            )
            .await
        }
    };

    shutdown_tracing();
    result
}
