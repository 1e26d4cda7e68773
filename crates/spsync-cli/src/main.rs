//! spsync CLI - Upload local files to a SharePoint document library
//!
//! Provides commands for:
//! - Synchronizing a glob of local files to a library folder
//! - Validating configuration and connectivity

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spsync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{check_config::CheckConfigCommand, sync::SyncCommand, ConfigOverrides};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "spsync",
    version,
    about = "Incremental upload of local files to SharePoint Online"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload new and changed files
    Sync(SyncCommand),
    /// Validate the configuration
    CheckConfig(CheckConfigCommand),
}

impl Commands {
    fn overrides(&self) -> &ConfigOverrides {
        match self {
            Commands::Sync(cmd) => &cmd.overrides,
            Commands::CheckConfig(cmd) => &cmd.overrides,
        }
    }
}

/// Filter directives from `-v` and the logging section; `RUST_LOG` wins.
fn log_directives(verbose: u8, logging: &LoggingConfig) -> String {
    let level = match verbose {
        0 if logging.debug => "debug",
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    if logging.debug_metadata {
        format!("{level},spsync_graph=trace")
    } else {
        level.to_string()
    }
}

fn init_tracing(verbose: u8, logging: &LoggingConfig, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(verbose, logging)));

    // Logs go to stderr so --json output stays parseable.
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let config = match commands::resolve_config(cli.config.as_deref(), cli.command.overrides()) {
        Ok(config) => config,
        Err(e) => {
            get_formatter(format).error(&format!("{e:#}"));
            return Ok(ExitCode::FAILURE);
        }
    };

    init_tracing(cli.verbose, &config.logging, cli.json_logs);

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(config, format).await,
        Commands::CheckConfig(cmd) => {
            cmd.execute(config, cli.config.as_deref(), format).await
        }
    }
}
