// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session Context
//!
//! Built once when authentication succeeds and passed by reference to every
//! dispatched operation. Nothing in it can change for the life of the session,
//! so the effective sandbox root and the permission mask are fixed at login.

use std::sync::Arc;

use crate::domain::identity::IdentityRecord;
use crate::domain::permission::Permissions;
use crate::domain::sandbox::SessionRoot;

#[derive(Debug, Clone)]
pub struct SessionContext {
    identity: Arc<IdentityRecord>,
    root: SessionRoot,
}

impl SessionContext {
    pub fn new(identity: IdentityRecord, root: SessionRoot) -> Self {
        Self {
            identity: Arc::new(identity),
            root,
        }
    }

    pub fn identity(&self) -> &IdentityRecord {
        &self.identity
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn permissions(&self) -> Permissions {
        self.identity.permissions
    }

    pub fn root(&self) -> &SessionRoot {
        &self.root
    }
}
