//! CLI command definitions for the `bflow` binary.

pub mod config;
pub mod demo;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Run task/workflow batches from the command line.
#[derive(Parser)]
#[command(name = "bflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for engine debug logs, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.toml (default: ~/.batchflow).
    #[arg(long, global = true, env = "BATCHFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Emit log lines as JSON objects.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a demonstration batch of data-processing tasks.
    Run {
        /// How the workflow is executed.
        #[arg(long, value_enum, default_value_t = Mode::Jit)]
        mode: Mode,

        /// Number of tasks in the workflow.
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=100))]
        tasks: u32,

        /// Polls each task needs before it reports Success.
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=100))]
        polls: u32,

        /// Override the heartbeat interval for deferred mode.
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Show the effective engine configuration.
    Config {
        /// Write the effective configuration to config.toml in the data directory.
        #[arg(long)]
        write: bool,
    },
}

/// Execution mode of the demonstration workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Run inline, re-driving the workflow until it completes.
    Jit,
    /// Queue in the pool and let the heartbeat drive it.
    Deferred,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Jit => "jit",
            Mode::Deferred => "deferred",
        }
    }
}
