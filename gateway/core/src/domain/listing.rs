// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directory Lister
//!
//! A snapshot of directory entries served in offset-addressed pages. The
//! transport asks for `max` entries starting at `offset` and advances its own
//! offset by however many it received.
//!
//! Paging contract:
//!
//! - An empty snapshot answers the first request at offset 0 with zero entries
//!   and *no* end marker. Some clients treat an immediate end marker on an
//!   empty directory as an error. Every later request gets the end marker.
//! - `offset >= len` is the end.
//! - A page with fewer entries than requested also carries the end marker.

use crate::domain::storage::DirEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<DirEntry>,
    /// No entries remain after this page.
    pub eof: bool,
}

#[derive(Debug, Clone)]
pub struct EntryLister {
    entries: Vec<DirEntry>,
    empty_page_served: bool,
}

impl EntryLister {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            entries,
            empty_page_served: false,
        }
    }

    /// Lister over exactly one entry (stat / lstat results).
    pub fn single(entry: DirEntry) -> Self {
        Self::new(vec![entry])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn list_at(&mut self, offset: u64, max: usize) -> ListPage {
        if self.entries.is_empty() && offset == 0 && !self.empty_page_served {
            self.empty_page_served = true;
            return ListPage {
                entries: Vec::new(),
                eof: false,
            };
        }

        let start = match usize::try_from(offset) {
            Ok(start) if start < self.entries.len() => start,
            _ => {
                return ListPage {
                    entries: Vec::new(),
                    eof: true,
                }
            }
        };

        let end = start.saturating_add(max).min(self.entries.len());
        let entries = self.entries[start..end].to_vec();
        let eof = entries.len() < max;
        ListPage { entries, eof }
    }
}
