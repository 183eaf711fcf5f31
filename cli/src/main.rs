// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Praxis CLI
//!
//! The `praxis` binary runs training-free experience learning from the
//! command line. Every command builds its services in-process from the
//! discovered configuration.
//!
//! ## Commands
//!
//! - `praxis train <dataset.jsonl>` - Run the training loop and write a report
//! - `praxis solve` - Answer problems with the current libraries, without learning
//! - `praxis library show|restore` - Inspect or roll back experience libraries
//! - `praxis knowledge add|search` - Maintain the rule knowledge base
//! - `praxis config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::{error, info};

use praxis_cli::commands::{
    self, ConfigCommand, KnowledgeCommand, LibraryCommand, SolveArgs, TrainArgs,
};

/// Praxis - learn from experience without touching model weights
#[derive(Parser)]
#[command(name = "praxis")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PRAXIS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PRAXIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this port while the command runs
    #[arg(long, global = true, env = "PRAXIS_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the training loop over a dataset
    #[command(name = "train")]
    Train(TrainArgs),

    /// Answer problems without updating any library
    #[command(name = "solve")]
    Solve(SolveArgs),

    /// Experience library management
    #[command(name = "library")]
    Library {
        #[command(subcommand)]
        command: LibraryCommand,
    },

    /// Knowledge base management
    #[command(name = "knowledge")]
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // API keys are usually referenced as env:VAR in the config
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    if let Some(port) = cli.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([127, 0, 0, 1], port))
            .install()
            .context("Failed to start metrics exporter")?;
        info!(port, "Serving metrics");
    }

    let result = match cli.command {
        Some(Commands::Train(args)) => commands::train::handle_command(args, cli.config).await,
        Some(Commands::Solve(args)) => commands::solve::handle_command(args, cli.config).await,
        Some(Commands::Library { command }) => {
            commands::library::handle_command(command, cli.config).await
        }
        Some(Commands::Knowledge { command }) => {
            commands::knowledge::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Initialize tracing subscriber for logging. Logs go to stderr so command
/// output on stdout stays machine-readable.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
