//! batchflow CLI entry point.
//!
//! Binary name: `bflow`
//!
//! Parses CLI arguments, sets up tracing, loads the engine configuration from
//! the data directory, then dispatches to the command handler.

mod cli;

use anyhow::anyhow;
use clap::Parser;

use batchflow_infra::config::load_engine_config;
use batchflow_infra::filesystem::resolve_data_dir;
use batchflow_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,batchflow_core=debug",
        _ => "trace",
    };
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(filter, format, cli.otel)
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(resolve_data_dir);
    let config = load_engine_config(&data_dir).await;

    let result = match cli.command {
        Commands::Run {
            mode,
            tasks,
            polls,
            interval_ms,
        } => {
            let options = cli::run::RunOptions {
                mode,
                tasks,
                polls,
                interval_ms,
                json: cli.json,
                quiet: cli.quiet,
            };
            cli::run::run_batch(&config, options).await
        }
        Commands::Config { write } => {
            cli::config::show_config(&data_dir, &config, write, cli.json).await
        }
    };

    shutdown_tracing();
    result
}
