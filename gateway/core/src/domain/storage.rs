// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File metadata as seen by the gateway.
//!
//! Produced from `std::fs::Metadata` after an operation has been authorized
//! and resolved. Encoding these values into a transport's wire format belongs
//! to the transport.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// File type for directory entries and attributes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    Symlink,
    /// Sockets, fifos, devices.
    Other,
}

impl FileType {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let ft = metadata.file_type();
        if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::File
        } else {
            FileType::Other
        }
    }
}

/// POSIX-style file attributes.
///
/// Ownership and link count are only populated on unix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub file_type: FileType,
    pub size: u64,
    /// Permission bits (e.g. `0o644`). Synthesized from the read-only flag
    /// on platforms without POSIX modes.
    pub mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub nlink: Option<u64>,
    /// Seconds since the Unix epoch.
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
}

impl FileAttributes {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = FileType::from_metadata(metadata);

        #[cfg(unix)]
        let (mode, uid, gid, nlink) = {
            use std::os::unix::fs::MetadataExt;
            (
                metadata.mode() & 0o7777,
                Some(metadata.uid()),
                Some(metadata.gid()),
                Some(metadata.nlink()),
            )
        };

        #[cfg(not(unix))]
        let (mode, uid, gid, nlink) = {
            let base = if metadata.permissions().readonly() { 0o444 } else { 0o666 };
            let mode = if file_type == FileType::Directory { base | 0o111 } else { base };
            (mode, None, None, None)
        };

        Self {
            file_type,
            size: metadata.len(),
            mode,
            uid,
            gid,
            nlink,
            atime: metadata.accessed().ok().and_then(unix_seconds),
            mtime: metadata.modified().ok().and_then(unix_seconds),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}

/// One named entry, as yielded by listings and stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Final path component, not the full path.
    pub name: String,
    pub attributes: FileAttributes,
}

fn unix_seconds(time: SystemTime) -> Option<i64> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).ok(),
        Err(e) => i64::try_from(e.duration().as_secs()).ok().map(|s| -s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_attributes_of_file_and_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"hello").unwrap();

        let attrs = FileAttributes::from_metadata(&std::fs::metadata(&file).unwrap());
        assert!(attrs.is_file());
        assert_eq!(attrs.size, 5);
        assert!(attrs.mtime.is_some());

        let attrs = FileAttributes::from_metadata(&std::fs::metadata(dir.path()).unwrap());
        assert!(attrs.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_type_from_symlink_metadata() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let lstat = FileAttributes::from_metadata(&std::fs::symlink_metadata(&link).unwrap());
        assert_eq!(lstat.file_type, FileType::Symlink);
        let stat = FileAttributes::from_metadata(&std::fs::metadata(&link).unwrap());
        assert_eq!(stat.file_type, FileType::File);
    }
}
