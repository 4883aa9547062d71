// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! The gateway consumes exactly one persistence capability: fetch a user
//! record by username. Where and how records are stored is not the core's
//! concern.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|-----------------|
//! | `UserDirectory` | `IdentityRecord` | `InMemoryUserDirectory` |

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::identity::IdentityRecord;

/// Lookup contract for principals.
///
/// Implementations must be safe to share between sessions. Callers bound each
/// lookup with their own timeout; an implementation should not retry
/// internally.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` means the user does not exist. Errors mean the directory
    /// could not answer.
    async fn find_by_username(&self, username: &str)
        -> Result<Option<IdentityRecord>, DirectoryError>;
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed record for {username}: {reason}")]
    MalformedRecord { username: String, reason: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}
