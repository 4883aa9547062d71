// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity Record
//!
//! The authenticated principal as returned by the user directory. One record
//! is fetched at authentication and then treated as immutable for the rest of
//! the session (see [`crate::domain::session::SessionContext`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::permission::Permissions;

/// A principal known to the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Unique directory key and the session's bound identity.
    pub username: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub group_name: String,

    /// Salted password hash (bcrypt or scrypt PHC string). `None` disables
    /// password authentication for this principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Single authorized-key line. `None` disables public-key authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Configured sandbox root. Empty means `<base-root>/<username>`.
    #[serde(default)]
    pub root_path: String,

    #[serde(default)]
    pub permissions: Permissions,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl IdentityRecord {
    /// Minimal enabled record with no credentials and an empty root.
    pub fn new(username: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            username: username.into(),
            display_name: String::new(),
            group_name: String::new(),
            password_hash: None,
            public_key: None,
            root_path: String::new(),
            permissions,
            disabled: false,
            created_at: Some(Utc::now()),
        }
    }

    pub fn with_root(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn with_public_key(mut self, authorized_key: impl Into<String>) -> Self {
        self.public_key = Some(authorized_key.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Password material, treating blank strings as absent.
    pub fn password_material(&self) -> Option<&str> {
        self.password_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// Public-key material, treating blank strings as absent.
    pub fn public_key_material(&self) -> Option<&str> {
        self.public_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
