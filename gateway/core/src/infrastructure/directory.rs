// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory user directory, seeded from the `users` list of the gateway
//! configuration. Suitable for single-node deployments, tests and the
//! operator CLI.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::identity::IdentityRecord;
use crate::domain::repository::{DirectoryError, UserDirectory};

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, IdentityRecord>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records with the same username replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let directory = Self::new();
        for record in records {
            directory.insert(record);
        }
        directory
    }

    /// Insert or replace, returning the previous record.
    pub fn insert(&self, record: IdentityRecord) -> Option<IdentityRecord> {
        self.users.write().insert(record.username.clone(), record)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// All records, sorted by username.
    pub fn records(&self) -> Vec<IdentityRecord> {
        let mut records: Vec<_> = self.users.read().values().cloned().collect();
        records.sort_by(|a, b| a.username.cmp(&b.username));
        records
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<IdentityRecord>, DirectoryError> {
        Ok(self.users.read().get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::Permissions;

    #[tokio::test]
    async fn test_lookup_is_exact() {
        let directory = InMemoryUserDirectory::from_records([
            IdentityRecord::new("alice", Permissions::READ),
            IdentityRecord::new("bob", Permissions::ALL),
        ]);
        assert_eq!(directory.len(), 2);

        let alice = directory.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(alice.permissions, Permissions::READ);
        assert!(directory.find_by_username("Alice").await.unwrap().is_none());
        assert!(directory.find_by_username("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let directory = InMemoryUserDirectory::new();
        assert!(directory.insert(IdentityRecord::new("alice", Permissions::READ)).is_none());
        let previous = directory.insert(IdentityRecord::new("alice", Permissions::ALL));
        assert_eq!(previous.unwrap().permissions, Permissions::READ);
        assert_eq!(directory.records().len(), 1);
    }
}
