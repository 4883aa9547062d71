// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sandgate_core::domain::gateway_config::GatewayConfigManifest;
use sandgate_core::domain::identity::IdentityRecord;
use sandgate_core::domain::permission::Permissions;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sandgate-config.yaml)
        #[arg(short, long, default_value = "./sandgate-config.yaml")]
        output: PathBuf,

        /// Include example users
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SANDGATE_CONFIG_PATH: {}",
            std::env::var("SANDGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sandgate-config.yaml");
        println!("  4. ~/.sandgate/config.yaml");
        println!("  5. /etc/sandgate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Gateway:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "Sandbox:".bold());
    println!("  Base root: {}", config.spec.base_root.display());
    println!("  Lookup timeout: {:?}", config.spec.lookup_timeout);
    println!("  Password scheme: {}", config.spec.password_scheme);
    println!();

    println!("{}", "Users:".bold());
    if config.spec.users.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for user in &config.spec.users {
        let status = if user.disabled {
            "disabled".red()
        } else {
            "enabled".green()
        };
        println!("  {} [{}] {}", user.username.bold(), user.permissions, status);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples);
    sample
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

pub fn sample_config(with_examples: bool) -> GatewayConfigManifest {
    let mut config = GatewayConfigManifest::default();
    if with_examples {
        let mut reader = IdentityRecord::new("reader", Permissions::READ | Permissions::LIST);
        reader.display_name = "Read-only user".to_string();
        reader.password_hash =
            Some("<output of `sandgate user hash-password`>".to_string());

        let mut uploader = IdentityRecord::new("uploader", Permissions::ALL);
        uploader.display_name = "Full-access user".to_string();
        uploader.root_path = "./data/fs/shared".to_string();

        config.spec.users = vec![reader, uploader];
    }
    config
}
