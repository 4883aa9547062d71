// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! User directory commands
//!
//! Commands: list, hash-password, resolve

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::io::BufRead;
use std::path::PathBuf;

use sandgate_core::domain::credential::PasswordScheme;
use sandgate_core::domain::gateway_config::GatewayConfigManifest;
use sandgate_core::domain::sandbox::{resolve_within, SandboxResolver};

#[derive(Subcommand)]
pub enum UserCommand {
    /// List configured users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Hash a password for the `password_hash` field
    HashPassword {
        /// Hash scheme (default: configured scheme)
        #[arg(long, value_parser = parse_scheme)]
        scheme: Option<PasswordScheme>,

        /// Read the password from the first line of stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },

    /// Show where a client path lands inside a user's sandbox
    Resolve {
        #[arg(value_name = "USERNAME")]
        username: String,

        #[arg(value_name = "PATH")]
        path: String,
    },
}

fn parse_scheme(s: &str) -> Result<PasswordScheme, String> {
    s.parse().map_err(|e| format!("{e}"))
}

pub async fn handle_command(command: UserCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    match command {
        UserCommand::List { json } => list(&config, json),
        UserCommand::HashPassword { scheme, stdin } => {
            hash_password(scheme.unwrap_or(config.spec.password_scheme), stdin).await
        }
        UserCommand::Resolve { username, path } => resolve(&config, &username, &path),
    }
}

fn list(config: &GatewayConfigManifest, json: bool) -> Result<()> {
    let mut users: Vec<_> = config.spec.users.iter().collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));

    if json {
        let rows: Vec<_> = users
            .iter()
            .map(|u| {
                serde_json::json!({
                    "username": u.username,
                    "display_name": u.display_name,
                    "group_name": u.group_name,
                    "root_path": u.root_path,
                    "permissions": u.permissions.to_string(),
                    "disabled": u.disabled,
                    "password": u.password_material().is_some(),
                    "public_key": u.public_key_material().is_some(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("{}", "No users configured".dimmed());
        return Ok(());
    }

    println!(
        "{:<20} {:<24} {:<10} {:<10} {}",
        "USERNAME".bold(),
        "PERMISSIONS".bold(),
        "AUTH".bold(),
        "STATUS".bold(),
        "ROOT".bold()
    );
    for user in users {
        let auth = match (user.password_material(), user.public_key_material()) {
            (Some(_), Some(_)) => "pw+key",
            (Some(_), None) => "pw",
            (None, Some(_)) => "key",
            (None, None) => "none",
        };
        let status = if user.disabled { "disabled".red() } else { "enabled".green() };
        let root = if user.root_path.is_empty() {
            "(derived)".dimmed().to_string()
        } else {
            user.root_path.clone()
        };
        println!(
            "{:<20} {:<24} {:<10} {:<10} {}",
            user.username,
            user.permissions.to_string(),
            auth,
            status,
            root
        );
    }
    Ok(())
}

async fn hash_password(scheme: PasswordScheme, from_stdin: bool) -> Result<()> {
    let password = if from_stdin {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        dialoguer::Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .context("Failed to read password")?
    };

    if password.is_empty() {
        return Err(anyhow!("Refusing to hash an empty password"));
    }

    let hash = tokio::task::spawn_blocking(move || scheme.hash(&password))
        .await
        .context("Hashing task failed")?
        .context("Failed to hash password")?;
    println!("{hash}");
    Ok(())
}

fn resolve(config: &GatewayConfigManifest, username: &str, path: &str) -> Result<()> {
    let identity = config
        .spec
        .users
        .iter()
        .find(|u| u.username == username)
        .ok_or_else(|| anyhow!("User not found: {username}"))?;

    let resolver = SandboxResolver::new(&config.spec.base_root)
        .context("Failed to resolve base root")?;
    let root = resolver
        .session_root(identity)
        .with_context(|| format!("No usable sandbox root for {username}"))?;

    println!("{} {}", "Root:".bold(), root.as_path().display());
    match resolve_within(&root, path) {
        Ok(resolved) => {
            println!("{} {}", "Resolved:".bold(), resolved.as_path().display());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Denied:".red().bold(), e);
            Err(anyhow!("Path {path:?} is not reachable for {username}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandgate_core::domain::identity::IdentityRecord;
    use sandgate_core::domain::permission::Permissions;

    fn config_with(base: &std::path::Path) -> GatewayConfigManifest {
        let mut config = GatewayConfigManifest::default();
        config.spec.base_root = base.to_path_buf();
        config.spec.users = vec![
            IdentityRecord::new("alice", Permissions::ALL),
            IdentityRecord::new("..", Permissions::ALL),
        ];
        config
    }

    #[test]
    fn test_parse_scheme() {
        assert_eq!(parse_scheme("bcrypt").unwrap(), PasswordScheme::Bcrypt);
        assert_eq!(parse_scheme("scrypt").unwrap(), PasswordScheme::Scrypt);
        assert!(parse_scheme("md5").is_err());
    }

    #[test]
    fn test_resolve_inside_and_outside() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with(dir.path());

        assert!(resolve(&config, "alice", "docs/../notes.txt").is_ok());
        assert!(resolve(&config, "alice", "../bob/secret").is_err());
        assert!(resolve(&config, "nobody", "/").is_err());
        assert!(resolve(&config, "..", "/").is_err());
        // Resolution is read-only; nothing is provisioned.
        assert!(!dir.path().join("alice").exists());
    }

    #[test]
    fn test_list_handles_empty_and_populated() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(list(&GatewayConfigManifest::default(), false).is_ok());
        assert!(list(&config_with(dir.path()), true).is_ok());
    }
}
