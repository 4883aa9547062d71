// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run single file operations as a configured user
//!
//! Commands: ls, stat, mkdir, rm, rmdir, mv, get, put, chmod, truncate
//!
//! Every command goes through `GatewayService::dispatch`, so the user's
//! permission mask and sandbox root apply exactly as they would for a
//! remote client.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use sandgate_core::application::GatewayService;
use sandgate_core::domain::fsal::FsalError;
use sandgate_core::domain::gateway_config::GatewayConfigManifest;
use sandgate_core::domain::operation::{AttributeBundle, OperationRequest};
use sandgate_core::domain::session::SessionContext;
use sandgate_core::domain::storage::{DirEntry, FileType};

const PAGE_SIZE: usize = 128;

#[derive(Subcommand)]
pub enum ExecCommand {
    /// List a directory
    Ls {
        #[arg(value_name = "PATH", default_value = "/")]
        path: String,
    },

    /// Show attributes of a path
    Stat {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Create a directory (and any missing parents)
    Mkdir {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Remove a file or empty directory
    Rm {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Remove a directory tree
    Rmdir {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Rename a path
    Mv {
        #[arg(value_name = "SOURCE")]
        source: String,

        #[arg(value_name = "TARGET")]
        target: String,
    },

    /// Download a file to the local filesystem
    Get {
        #[arg(value_name = "REMOTE")]
        remote: String,

        #[arg(value_name = "LOCAL")]
        local: PathBuf,
    },

    /// Upload a local file
    Put {
        #[arg(value_name = "LOCAL")]
        local: PathBuf,

        #[arg(value_name = "REMOTE")]
        remote: String,
    },

    /// Change permission bits (octal, e.g. 640)
    Chmod {
        #[arg(value_name = "MODE", value_parser = parse_octal_mode)]
        mode: u32,

        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Truncate or extend a file to SIZE bytes (SIZE must be non-zero)
    Truncate {
        #[arg(value_name = "SIZE", value_parser = parse_nonzero_size)]
        size: u64,

        #[arg(value_name = "PATH")]
        path: String,
    },
}

fn parse_octal_mode(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .map_err(|_| format!("'{s}' is not an octal mode"))
        .and_then(|mode| {
            if mode > 0o7777 {
                Err(format!("'{s}' is out of range"))
            } else {
                Ok(mode)
            }
        })
}

/// A size of zero in a set-attributes request means "no size given" and is
/// never applied, so it is refused here instead of silently doing nothing.
fn parse_nonzero_size(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("size 0 is treated as absent and never truncates; \
                      remove and re-create the file to empty it"
            .to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("'{s}' is not a byte count")),
    }
}

pub async fn handle_command(
    username: &str,
    command: ExecCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let service = GatewayService::from_config(&config).context("Failed to start gateway")?;
    let session = service
        .operator_session(username)
        .await
        .with_context(|| format!("Cannot open a session for {username}"))?;

    run(&service, &session, command).await
}

async fn run(service: &GatewayService, session: &SessionContext, command: ExecCommand) -> Result<()> {
    match command {
        ExecCommand::Ls { path } => {
            let mut lister = dispatch(service, session, OperationRequest::List { path })
                .await?
                .into_lister()
                .ok_or_else(|| anyhow!("List returned no entries"))?;
            let mut offset = 0u64;
            loop {
                let page = lister.list_at(offset, PAGE_SIZE);
                offset += page.entries.len() as u64;
                for entry in &page.entries {
                    print_entry(entry);
                }
                if page.eof {
                    break;
                }
            }
            if offset == 0 {
                println!("{}", "(empty)".dimmed());
            }
        }
        ExecCommand::Stat { path } => {
            let lister = dispatch(service, session, OperationRequest::Stat { path })
                .await?
                .into_lister()
                .ok_or_else(|| anyhow!("Stat returned no entry"))?;
            for entry in lister.entries() {
                print_stat(entry);
            }
        }
        ExecCommand::Mkdir { path } => {
            dispatch(service, session, OperationRequest::Mkdir { path: path.clone() }).await?;
            println!("{}", format!("✓ Created {path}").green());
        }
        ExecCommand::Rm { path } => {
            dispatch(service, session, OperationRequest::Remove { path: path.clone() }).await?;
            println!("{}", format!("✓ Removed {path}").green());
        }
        ExecCommand::Rmdir { path } => {
            dispatch(service, session, OperationRequest::Rmdir { path: path.clone() }).await?;
            println!("{}", format!("✓ Removed {path} recursively").green());
        }
        ExecCommand::Mv { source, target } => {
            let request = OperationRequest::Rename {
                source: source.clone(),
                target: target.clone(),
            };
            dispatch(service, session, request).await?;
            println!("{}", format!("✓ Renamed {source} -> {target}").green());
        }
        ExecCommand::Get { remote, local } => {
            let reader = dispatch(service, session, OperationRequest::Read { path: remote.clone() })
                .await?
                .into_reader()
                .ok_or_else(|| anyhow!("Read returned no handle"))?;
            let data = reader
                .read_to_end()
                .await
                .with_context(|| format!("Failed to read {remote}"))?;
            tokio::fs::write(&local, &data)
                .await
                .with_context(|| format!("Failed to write {:?}", local))?;
            println!(
                "{}",
                format!("✓ {} bytes -> {}", data.len(), local.display()).green()
            );
        }
        ExecCommand::Put { local, remote } => {
            let data = tokio::fs::read(&local)
                .await
                .with_context(|| format!("Failed to read {:?}", local))?;
            let writer = dispatch(service, session, OperationRequest::Write { path: remote.clone() })
                .await?
                .into_writer()
                .ok_or_else(|| anyhow!("Write returned no handle"))?;
            let written = writer
                .write_at(0, data)
                .await
                .with_context(|| format!("Failed to write {remote}"))?;
            writer.sync().await.with_context(|| format!("Failed to sync {remote}"))?;
            println!("{}", format!("✓ {written} bytes -> {remote}").green());
        }
        ExecCommand::Chmod { mode, path } => {
            let request = OperationRequest::SetAttributes {
                path: path.clone(),
                attributes: AttributeBundle::default().with_mode(mode),
            };
            dispatch(service, session, request).await?;
            println!("{}", format!("✓ Mode of {path} set to {mode:o}").green());
        }
        ExecCommand::Truncate { size, path } => {
            let request = OperationRequest::SetAttributes {
                path: path.clone(),
                attributes: AttributeBundle::default().with_size(size),
            };
            dispatch(service, session, request).await?;
            println!("{}", format!("✓ Size of {path} set to {size}").green());
        }
    }
    Ok(())
}

async fn dispatch(
    service: &GatewayService,
    session: &SessionContext,
    request: OperationRequest,
) -> Result<sandgate_core::domain::fsal::OperationOutcome> {
    let label = request.to_string();
    debug!(username = %session.username(), request = %label, "Dispatching operator request");
    service.dispatch(session, request).await.map_err(|e| {
        let status = e.client_status();
        match &e {
            FsalError::AccessDenied(_) => eprintln!("{} {}", "Permission denied:".red().bold(), e),
            _ => eprintln!("{} {}", format!("{status:?}:").red().bold(), e),
        }
        anyhow::Error::new(e).context(format!("{label} failed"))
    })
}

fn type_marker(file_type: FileType) -> char {
    match file_type {
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::File => '-',
        FileType::Other => '?',
    }
}

fn format_mtime(mtime: Option<i64>) -> String {
    mtime
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_entry(entry: &DirEntry) {
    let attrs = &entry.attributes;
    let name = if attrs.is_dir() {
        format!("{}/", entry.name).blue().bold()
    } else {
        entry.name.normal()
    };
    println!(
        "{}{:04o} {:>12} {} {}",
        type_marker(attrs.file_type),
        attrs.mode & 0o7777,
        attrs.size,
        format_mtime(attrs.mtime),
        name
    );
}

fn print_stat(entry: &DirEntry) {
    let attrs = &entry.attributes;
    println!("{} {}", "Name:".bold(), entry.name);
    println!("{} {:?}", "Type:".bold(), attrs.file_type);
    println!("{} {}", "Size:".bold(), attrs.size);
    println!("{} {:04o}", "Mode:".bold(), attrs.mode & 0o7777);
    if let (Some(uid), Some(gid)) = (attrs.uid, attrs.gid) {
        println!("{} {uid}:{gid}", "Owner:".bold());
    }
    if let Some(nlink) = attrs.nlink {
        println!("{} {nlink}", "Links:".bold());
    }
    println!("{} {}", "Accessed:".bold(), format_mtime(attrs.atime));
    println!("{} {}", "Modified:".bold(), format_mtime(attrs.mtime));
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandgate_core::domain::identity::IdentityRecord;
    use sandgate_core::domain::permission::Permissions;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> PathBuf {
        let mut config = GatewayConfigManifest::default();
        config.spec.base_root = dir.path().join("fs");
        config.spec.users = vec![
            IdentityRecord::new("alice", Permissions::ALL),
            IdentityRecord::new("viewer", Permissions::READ | Permissions::LIST),
            IdentityRecord::new("gone", Permissions::ALL).disabled(),
        ];
        let path = dir.path().join("sandgate-config.yaml");
        config.to_yaml_file(&path).unwrap();
        path
    }

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("640").unwrap(), 0o640);
        assert_eq!(parse_octal_mode("0o755").unwrap(), 0o755);
        assert_eq!(parse_octal_mode("0755").unwrap(), 0o755);
        assert!(parse_octal_mode("9").is_err());
        assert!(parse_octal_mode("17777").is_err());
    }

    #[test]
    fn test_truncate_to_zero_is_refused() {
        #[derive(clap::Parser)]
        struct Harness {
            #[command(subcommand)]
            command: ExecCommand,
        }

        assert_eq!(parse_nonzero_size("16").unwrap(), 16);
        assert!(parse_nonzero_size("0").unwrap_err().contains("treated as absent"));
        assert!(parse_nonzero_size("-1").is_err());

        use clap::Parser;
        assert!(Harness::try_parse_from(["exec", "truncate", "0", "big.bin"]).is_err());
        let parsed = Harness::try_parse_from(["exec", "truncate", "8", "big.bin"]).unwrap();
        assert!(matches!(parsed.command, ExecCommand::Truncate { size: 8, .. }));
    }

    #[test]
    fn test_format_mtime() {
        assert_eq!(format_mtime(None), "-");
        assert_eq!(format_mtime(Some(0)), "1970-01-01 00:00");
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let local = dir.path().join("upload.txt");
        std::fs::write(&local, b"payload").unwrap();

        handle_command(
            "alice",
            ExecCommand::Put {
                local: local.clone(),
                remote: "/docs/upload.txt".to_string(),
            },
            Some(config.clone()),
        )
        .await
        .unwrap();

        let stored = dir.path().join("fs/alice/docs/upload.txt");
        assert_eq!(std::fs::read(&stored).unwrap(), b"payload");

        let download = dir.path().join("download.txt");
        handle_command(
            "alice",
            ExecCommand::Get {
                remote: "docs/upload.txt".to_string(),
                local: download.clone(),
            },
            Some(config),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&download).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_read_only_user_cannot_mkdir() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);

        let result = handle_command(
            "viewer",
            ExecCommand::Mkdir {
                path: "/nope".to_string(),
            },
            Some(config),
        )
        .await;

        assert!(result.is_err());
        assert!(!dir.path().join("fs/viewer/nope").exists());
    }

    #[tokio::test]
    async fn test_disabled_and_unknown_users_are_refused() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);

        for username in ["gone", "nobody"] {
            let result = handle_command(
                username,
                ExecCommand::Ls { path: "/".to_string() },
                Some(config.clone()),
            )
            .await;
            assert!(result.is_err(), "{username} should be refused");
        }
        assert!(!dir.path().join("fs/gone").exists());
    }

    #[tokio::test]
    async fn test_mv_out_of_sandbox_is_denied() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        std::fs::create_dir_all(dir.path().join("fs/alice")).unwrap();
        std::fs::write(dir.path().join("fs/alice/a.txt"), b"x").unwrap();

        let result = handle_command(
            "alice",
            ExecCommand::Mv {
                source: "a.txt".to_string(),
                target: "../../a.txt".to_string(),
            },
            Some(config),
        )
        .await;

        assert!(result.is_err());
        assert!(dir.path().join("fs/alice/a.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_truncate_and_ls_empty_directory() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        std::fs::create_dir_all(dir.path().join("fs/alice/empty")).unwrap();
        std::fs::write(dir.path().join("fs/alice/big.bin"), vec![7u8; 64]).unwrap();

        handle_command(
            "alice",
            ExecCommand::Truncate {
                size: 16,
                path: "big.bin".to_string(),
            },
            Some(config.clone()),
        )
        .await
        .unwrap();
        let len = std::fs::metadata(dir.path().join("fs/alice/big.bin")).unwrap().len();
        assert_eq!(len, 16);

        handle_command(
            "alice",
            ExecCommand::Ls {
                path: "empty".to_string(),
            },
            Some(config),
        )
        .await
        .unwrap();
    }
}
