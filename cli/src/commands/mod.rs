// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Sandgate CLI

pub mod config;
pub mod exec;
pub mod user;

pub use self::config::ConfigCommand;
pub use self::exec::ExecCommand;
pub use self::user::UserCommand;
