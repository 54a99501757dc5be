// Chorus gateway
// Main entry point for the chorus binary

use chorus_engine::cli::{Cli, Command};
use chorus_engine::config::Config;
use chorus_engine::handlers::{
    handle_ask, handle_bench, handle_history, handle_models, handle_serve, AskOptions,
    OutputFormat,
};
use chorus_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Chorus v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    if let Some(level) = &cli.log {
        config.set_log_level(level)?;
    }

    // Swap in the config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    init_telemetry_with_level(&config.core.log_level);

    match cli.command {
        Command::Serve { bind } => {
            tracing::info!("Starting gateway...");
            handle_serve(bind, &config).await
        }

        Command::Ask {
            message,
            models,
            no_synthesis,
            min_for_synthesis,
            owner,
            server,
        } => {
            let options = AskOptions {
                message,
                models,
                synthesize: !no_synthesis,
                min_for_synthesis,
                owner,
                server,
            };
            handle_ask(options, &config, format).await
        }

        Command::Models => handle_models(&config, format).await,

        Command::History { owner, limit } => {
            tracing::info!("Showing last {} turns", limit);
            handle_history(owner, limit, &config, format).await
        }

        Command::Bench {
            server,
            trials,
            prompts,
            models,
        } => {
            tracing::info!("Benchmarking {} ({} trials per prompt)", server, trials);
            handle_bench(server, trials, prompts, models, &config, format).await
        }
    }
}
