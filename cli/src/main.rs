// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Sandgate Operator CLI
//!
//! The `sandgate` binary inspects and exercises a gateway configuration
//! without a transport in front of it.
//!
//! ## Commands
//!
//! - `sandgate config show|validate|generate` - Configuration management
//! - `sandgate user list|hash-password|resolve` - User directory tooling
//! - `sandgate exec <USER> <op>` - Run one file operation as a user, through
//!   the same permission gates and sandbox a remote client would hit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use sandgate::commands::{self, ConfigCommand, ExecCommand, UserCommand};

/// Sandgate - sandboxed multi-tenant file access
#[derive(Parser)]
#[command(name = "sandgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SANDGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SANDGATE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// User directory tooling
    #[command(name = "user")]
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Run one file operation on behalf of a configured user
    #[command(name = "exec")]
    Exec {
        /// User whose sandbox and permissions apply
        #[arg(value_name = "USERNAME")]
        username: String,

        #[command(subcommand)]
        command: ExecCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::User { command }) => {
            commands::user::handle_command(command, cli.config).await
        }
        Some(Commands::Exec { username, command }) => {
            commands::exec::handle_command(&username, command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
