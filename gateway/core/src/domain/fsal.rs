// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SandboxFSAL - Transport-Agnostic File System Abstraction Layer
//!
//! The security boundary every file operation passes through. For each
//! request, in this order:
//!
//! 1. Capability check against the session's permission mask
//! 2. Path resolution inside the session root (fails closed)
//! 3. The filesystem action itself, on the blocking pool
//! 4. Translation of the outcome into a handle, lister or plain success
//!
//! A failure at step 1 or 2 returns before the filesystem is touched.
//!
//! Used by:
//! - SFTP-style request servers (one dispatch per client request)
//! - The `sandgate exec` operator command

use std::fmt;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::handle::{join_error, FileReader, FileWriter};
use crate::domain::listing::EntryLister;
use crate::domain::operation::{AttributeBundle, OperationRequest};
use crate::domain::permission::Requirement;
use crate::domain::sandbox::{ResolvedPath, SandboxError, SandboxResolver, SessionRoot};
use crate::domain::session::SessionContext;
use crate::domain::storage::{DirEntry, FileAttributes};

/// Mode for files created by write operations.
pub const FILE_CREATE_MODE: u32 = 0o644;
/// Mode for directories created by write and mkdir operations.
pub const DIR_CREATE_MODE: u32 = 0o755;

/// Why an operation was refused.
#[derive(Debug)]
pub enum DenialReason {
    MissingCapability {
        username: String,
        operation: String,
        required: Requirement,
    },
    SandboxEscape(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::MissingCapability {
                username,
                operation,
                required,
            } => write!(f, "{username} lacks {required} permission for {operation}"),
            DenialReason::SandboxEscape(detail) => f.write_str(detail),
        }
    }
}

/// SandboxFSAL errors
#[derive(Debug, Error)]
pub enum FsalError {
    #[error("Access denied: {0}")]
    AccessDenied(DenialReason),

    #[error("Path resolution failed: {0}")]
    PathResolution(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Status a transport reports to its client.
///
/// Deliberately coarser than [`FsalError`]: a missing capability and a sandbox
/// escape both surface as `PermissionDenied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    PermissionDenied,
    NoSuchFile,
    OpUnsupported,
    Failure,
}

impl FsalError {
    pub fn client_status(&self) -> ClientStatus {
        match self {
            FsalError::AccessDenied(_) => ClientStatus::PermissionDenied,
            FsalError::NotFound(_) => ClientStatus::NoSuchFile,
            FsalError::InvalidOperation(_) => ClientStatus::OpUnsupported,
            FsalError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                ClientStatus::PermissionDenied
            }
            FsalError::Io(e) if e.kind() == io::ErrorKind::NotFound => ClientStatus::NoSuchFile,
            FsalError::PathResolution(_) | FsalError::Io(_) => ClientStatus::Failure,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, FsalError::AccessDenied(_))
    }
}

impl From<SandboxError> for FsalError {
    fn from(err: SandboxError) -> Self {
        if err.is_denial() {
            FsalError::AccessDenied(DenialReason::SandboxEscape(err.to_string()))
        } else {
            FsalError::PathResolution(err.to_string())
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub enum OperationOutcome {
    Reader(FileReader),
    Writer(FileWriter),
    Lister(EntryLister),
    Done,
}

impl OperationOutcome {
    pub fn into_reader(self) -> Option<FileReader> {
        match self {
            OperationOutcome::Reader(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_writer(self) -> Option<FileWriter> {
        match self {
            OperationOutcome::Writer(w) => Some(w),
            _ => None,
        }
    }

    pub fn into_lister(self) -> Option<EntryLister> {
        match self {
            OperationOutcome::Lister(l) => Some(l),
            _ => None,
        }
    }
}

/// SandboxFSAL - File System Abstraction Layer
///
/// Stateless apart from the resolver; share one instance across sessions
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SandboxFsal {
    resolver: SandboxResolver,
}

impl SandboxFsal {
    pub fn new(resolver: SandboxResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &SandboxResolver {
        &self.resolver
    }

    /// Execute one request for `session`.
    pub async fn dispatch(
        &self,
        session: &SessionContext,
        request: OperationRequest,
    ) -> Result<OperationOutcome, FsalError> {
        debug!(username = %session.username(), operation = %request, "Dispatching operation");

        if let OperationRequest::Unsupported { method, .. } = &request {
            warn!(username = %session.username(), method = %method, "Unsupported file command");
            return Err(FsalError::InvalidOperation(format!(
                "unsupported method {method:?}"
            )));
        }

        let required = request.required();
        if !required.is_satisfied_by(session.permissions()) {
            warn!(
                username = %session.username(),
                operation = %request,
                required = %required,
                granted = %session.permissions(),
                "Permission denied"
            );
            return Err(FsalError::AccessDenied(DenialReason::MissingCapability {
                username: session.username().to_string(),
                operation: request.method().to_string(),
                required,
            }));
        }

        let resolver = self.resolver.clone();
        let root = session.root().clone();
        tokio::task::spawn_blocking(move || execute(&resolver, &root, request))
            .await
            .map_err(join_error)?
    }
}

fn execute(
    resolver: &SandboxResolver,
    root: &SessionRoot,
    request: OperationRequest,
) -> Result<OperationOutcome, FsalError> {
    match request {
        OperationRequest::Read { path } => {
            let resolved = resolver.resolve(root, &path)?;
            let file = File::open(resolved.as_path()).map_err(|e| io_failure(&resolved, "open", e))?;
            debug!(path = %resolved.as_path().display(), "Opened file for reading");
            Ok(OperationOutcome::Reader(FileReader::new(file, resolved.into_path_buf())))
        }
        OperationRequest::Write { path } => {
            let resolved = resolver.resolve(root, &path)?;
            if let Some(parent) = resolved.as_path().parent() {
                dir_builder()
                    .create(parent)
                    .map_err(|e| io_failure(&resolved, "create parent directories", e))?;
            }
            let file = write_options()
                .open(resolved.as_path())
                .map_err(|e| io_failure(&resolved, "open for writing", e))?;
            debug!(path = %resolved.as_path().display(), "Opened file for writing");
            Ok(OperationOutcome::Writer(FileWriter::new(file, resolved.into_path_buf())))
        }
        OperationRequest::List { path } => {
            let resolved = resolver.resolve(root, &path)?;
            let entries = read_entries(&resolved)?;
            debug!(path = %resolved.as_path().display(), count = entries.len(), "Listed directory");
            Ok(OperationOutcome::Lister(EntryLister::new(entries)))
        }
        OperationRequest::Stat { path } => {
            let resolved = resolver.resolve(root, &path)?;
            let metadata = fs::metadata(resolved.as_path()).map_err(|e| io_failure(&resolved, "stat", e))?;
            Ok(OperationOutcome::Lister(EntryLister::single(entry_for(&resolved, &metadata))))
        }
        OperationRequest::Lstat { path } => {
            let resolved = resolver.resolve(root, &path)?;
            let metadata = fs::symlink_metadata(resolved.as_path())
                .map_err(|e| io_failure(&resolved, "lstat", e))?;
            Ok(OperationOutcome::Lister(EntryLister::single(entry_for(&resolved, &metadata))))
        }
        OperationRequest::Remove { path } => {
            let resolved = resolver.resolve(root, &path)?;
            refuse_root(&resolved, "Remove")?;
            let metadata = fs::symlink_metadata(resolved.as_path())
                .map_err(|e| io_failure(&resolved, "remove", e))?;
            let result = if metadata.is_dir() {
                fs::remove_dir(resolved.as_path())
            } else {
                fs::remove_file(resolved.as_path())
            };
            result.map_err(|e| io_failure(&resolved, "remove", e))?;
            debug!(path = %resolved.as_path().display(), "Removed");
            Ok(OperationOutcome::Done)
        }
        OperationRequest::Rmdir { path } => {
            let resolved = resolver.resolve(root, &path)?;
            refuse_root(&resolved, "Rmdir")?;
            fs::remove_dir_all(resolved.as_path()).map_err(|e| io_failure(&resolved, "rmdir", e))?;
            debug!(path = %resolved.as_path().display(), "Removed directory tree");
            Ok(OperationOutcome::Done)
        }
        OperationRequest::Rename { source, target } => {
            let from = resolver.resolve(root, &source)?;
            let to = resolver.resolve(root, &target)?;
            refuse_root(&from, "Rename")?;
            fs::rename(from.as_path(), to.as_path()).map_err(|e| io_failure(&from, "rename", e))?;
            debug!(
                from = %from.as_path().display(),
                to = %to.as_path().display(),
                "Renamed"
            );
            Ok(OperationOutcome::Done)
        }
        OperationRequest::Mkdir { path } => {
            let resolved = resolver.resolve(root, &path)?;
            dir_builder()
                .create(resolved.as_path())
                .map_err(|e| io_failure(&resolved, "mkdir", e))?;
            debug!(path = %resolved.as_path().display(), "Created directory");
            Ok(OperationOutcome::Done)
        }
        OperationRequest::SetAttributes { path, attributes } => {
            let resolved = resolver.resolve(root, &path)?;
            apply_attributes(&resolved, &attributes)?;
            Ok(OperationOutcome::Done)
        }
        OperationRequest::Unsupported { method, .. } => Err(FsalError::InvalidOperation(format!(
            "unsupported method {method:?}"
        ))),
    }
}

/// Apply a set-attributes bundle: mode, then times, then ownership, then
/// size. The first failure stops the sequence.
pub fn apply_attributes(resolved: &ResolvedPath, attributes: &AttributeBundle) -> Result<(), FsalError> {
    let path = resolved.as_path();
    if attributes.is_empty() {
        debug!(path = %path.display(), "No attributes provided");
        return Ok(());
    }

    if let Some(mode) = attributes.mode.filter(|m| *m != 0) {
        set_mode(path, mode & 0o777).map_err(|e| io_failure(resolved, "chmod", e))?;
        debug!(path = %path.display(), mode = %format!("{:04o}", mode & 0o777), "Applied chmod");
    }

    if let (Some(atime), Some(mtime)) = (
        attributes.atime.or(attributes.mtime),
        attributes.mtime.or(attributes.atime),
    ) {
        filetime::set_file_times(
            path,
            FileTime::from_system_time(atime),
            FileTime::from_system_time(mtime),
        )
        .map_err(|e| io_failure(resolved, "chtimes", e))?;
        debug!(path = %path.display(), "Applied access and modification times");
    }

    if attributes.uid.is_some() || attributes.gid.is_some() {
        set_owner(path, attributes.uid, attributes.gid)
            .map_err(|e| io_failure(resolved, "chown", e))?;
    }

    match attributes.size {
        Some(size) if size > 0 => {
            let metadata = fs::metadata(path).map_err(|e| io_failure(resolved, "stat before truncate", e))?;
            if metadata.is_file() {
                OpenOptions::new()
                    .write(true)
                    .open(path)
                    .and_then(|f| f.set_len(size))
                    .map_err(|e| io_failure(resolved, "truncate", e))?;
                debug!(path = %path.display(), size, "Applied truncate");
            } else {
                warn!(path = %path.display(), "Skip truncate: not a regular file");
            }
        }
        Some(_) => {
            debug!(path = %path.display(), "Size 0 ignored; not applying truncate");
        }
        None => {}
    }

    Ok(())
}

fn read_entries(resolved: &ResolvedPath) -> Result<Vec<DirEntry>, FsalError> {
    let reader = fs::read_dir(resolved.as_path()).map_err(|e| io_failure(resolved, "list", e))?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| io_failure(resolved, "list", e))?;
        // DirEntry::metadata does not follow symlinks.
        match entry.metadata() {
            Ok(metadata) => entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                attributes: FileAttributes::from_metadata(&metadata),
            }),
            Err(e) => {
                debug!(entry = %entry.path().display(), error = %e, "Skipping entry that vanished during listing");
            }
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn entry_for(resolved: &ResolvedPath, metadata: &fs::Metadata) -> DirEntry {
    let name = if resolved.is_root() {
        "/".to_string()
    } else {
        resolved
            .as_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    };
    DirEntry {
        name,
        attributes: FileAttributes::from_metadata(metadata),
    }
}

fn refuse_root(resolved: &ResolvedPath, method: &str) -> Result<(), FsalError> {
    if resolved.is_root() {
        warn!(method, "Refusing to operate on the session root itself");
        return Err(FsalError::InvalidOperation(format!(
            "{method} cannot target the session root"
        )));
    }
    Ok(())
}

fn io_failure(resolved: &ResolvedPath, action: &str, err: io::Error) -> FsalError {
    let path = resolved.as_path();
    if err.kind() == io::ErrorKind::NotFound {
        debug!(path = %path.display(), action, "Path not found");
        return FsalError::NotFound(path.to_path_buf());
    }
    error!(path = %path.display(), action, error = %err, "Filesystem operation failed");
    FsalError::Io(err)
}

fn dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_CREATE_MODE);
    }
    builder
}

fn write_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_CREATE_MODE);
    }
    options
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    // Only the owner-write bit has a counterpart here.
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions)
}

#[cfg(unix)]
fn set_owner(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    std::os::unix::fs::chown(path, uid, gid)?;
    debug!(path = %path.display(), ?uid, ?gid, "Applied chown");
    Ok(())
}

#[cfg(not(unix))]
fn set_owner(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    debug!(path = %path.display(), ?uid, ?gid, "Skipping chown on a platform without POSIX ownership");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::IdentityRecord;
    use crate::domain::permission::Permissions;
    use tempfile::TempDir;

    fn setup(permissions: Permissions) -> (TempDir, SandboxFsal, SessionContext) {
        let base = TempDir::new().unwrap();
        let resolver = SandboxResolver::new(base.path()).unwrap();
        let identity = IdentityRecord::new("alice", permissions);
        let root = resolver.session_root(&identity).unwrap();
        let session = SessionContext::new(identity, root);
        (base, SandboxFsal::new(resolver), session)
    }

    fn path_in(session: &SessionContext, rel: &str) -> PathBuf {
        session.root().as_path().join(rel)
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_truncates() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        let writer = fsal
            .dispatch(&session, OperationRequest::Write { path: "/deep/nested/file.txt".into() })
            .await
            .unwrap()
            .into_writer()
            .unwrap();
        writer.write_at(0, b"first version".to_vec()).await.unwrap();
        drop(writer);

        let writer = fsal
            .dispatch(&session, OperationRequest::Write { path: "deep/nested/file.txt".into() })
            .await
            .unwrap()
            .into_writer()
            .unwrap();
        writer.write_at(0, b"v2".to_vec()).await.unwrap();
        drop(writer);

        let contents = fs::read(path_in(&session, "deep/nested/file.txt")).unwrap();
        assert_eq!(contents, b"v2");
    }

    #[tokio::test]
    async fn test_missing_capability_is_checked_before_resolution() {
        let (_base, fsal, session) = setup(Permissions::READ);
        // Would be an escape, but the capability check comes first.
        let err = fsal
            .dispatch(&session, OperationRequest::Mkdir { path: "../../outside".into() })
            .await
            .unwrap_err();
        assert!(
            matches!(&err, FsalError::AccessDenied(DenialReason::MissingCapability { .. })),
            "expected missing capability, got {err:?}"
        );
        assert_eq!(err.client_status(), ClientStatus::PermissionDenied);
        assert!(!session.root().as_path().exists());
    }

    #[tokio::test]
    async fn test_escape_maps_to_permission_denied_status() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        let err = fsal
            .dispatch(&session, OperationRequest::List { path: "../".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, FsalError::AccessDenied(DenialReason::SandboxEscape(_))));
        assert_eq!(err.client_status(), ClientStatus::PermissionDenied);
    }

    #[tokio::test]
    async fn test_stat_and_lstat_accept_read_or_list() {
        let (_base, fsal, session) = setup(Permissions::LIST);
        let lister = fsal
            .dispatch(&session, OperationRequest::Stat { path: "/".into() })
            .await
            .unwrap()
            .into_lister()
            .unwrap();
        assert_eq!(lister.len(), 1);
        assert_eq!(lister.entries()[0].name, "/");
        assert!(lister.entries()[0].attributes.is_dir());

        let (_base, fsal, session) = setup(Permissions::READ);
        assert!(fsal
            .dispatch(&session, OperationRequest::Lstat { path: "/".into() })
            .await
            .is_ok());

        let (_base, fsal, session) = setup(Permissions::WRITE | Permissions::DELETE);
        assert!(fsal
            .dispatch(&session, OperationRequest::Stat { path: "/".into() })
            .await
            .unwrap_err()
            .is_access_denied());
    }

    #[tokio::test]
    async fn test_stat_missing_file_is_not_found() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        let err = fsal
            .dispatch(&session, OperationRequest::Stat { path: "/ghost".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, FsalError::NotFound(_)));
        assert_eq!(err.client_status(), ClientStatus::NoSuchFile);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_paged() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        fsal.dispatch(&session, OperationRequest::Mkdir { path: "dir".into() })
            .await
            .unwrap();
        for name in ["c", "a", "b"] {
            fs::write(path_in(&session, &format!("dir/{name}")), name).unwrap();
        }

        let mut lister = fsal
            .dispatch(&session, OperationRequest::List { path: "/dir".into() })
            .await
            .unwrap()
            .into_lister()
            .unwrap();
        let page = lister.list_at(0, 10);
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(page.eof);
    }

    #[tokio::test]
    async fn test_remove_and_rmdir() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        fs::create_dir_all(path_in(&session, "tree/inner")).unwrap();
        fs::write(path_in(&session, "tree/inner/f"), b"x").unwrap();
        fs::write(path_in(&session, "single"), b"x").unwrap();

        fsal.dispatch(&session, OperationRequest::Remove { path: "single".into() })
            .await
            .unwrap();
        assert!(!path_in(&session, "single").exists());

        fsal.dispatch(&session, OperationRequest::Rmdir { path: "tree".into() })
            .await
            .unwrap();
        assert!(!path_in(&session, "tree").exists());
    }

    #[tokio::test]
    async fn test_root_cannot_be_removed() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        let err = fsal
            .dispatch(&session, OperationRequest::Rmdir { path: "/".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, FsalError::InvalidOperation(_)));
        assert!(session.root().as_path().is_dir());
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (_base, fsal, session) = setup(Permissions::ALL);
        let err = fsal
            .dispatch(&session, OperationRequest::from_method("Symlink", "/a", Some("/b"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, FsalError::InvalidOperation(_)));
        assert_eq!(err.client_status(), ClientStatus::OpUnsupported);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_set_mode_masks_to_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let (_base, fsal, session) = setup(Permissions::ALL);
        fs::create_dir_all(session.root().as_path()).unwrap();
        let file = path_in(&session, "script.sh");
        fs::write(&file, b"#!/bin/sh\n").unwrap();

        fsal.dispatch(
            &session,
            OperationRequest::SetAttributes {
                path: "script.sh".into(),
                attributes: AttributeBundle::default().with_mode(0o104_750),
            },
        )
        .await
        .unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);
    }

    #[tokio::test]
    async fn test_single_time_is_reused_for_both() {
        use std::time::{Duration, UNIX_EPOCH};

        let (_base, fsal, session) = setup(Permissions::ALL);
        fs::create_dir_all(session.root().as_path()).unwrap();
        let file = path_in(&session, "stamped");
        fs::write(&file, b"x").unwrap();
        let when = UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        fsal.dispatch(
            &session,
            OperationRequest::SetAttributes {
                path: "stamped".into(),
                attributes: AttributeBundle::default().with_times(None, Some(when)),
            },
        )
        .await
        .unwrap();

        let metadata = fs::metadata(&file).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&metadata).unix_seconds(), 1_600_000_000);
        assert_eq!(FileTime::from_last_access_time(&metadata).unix_seconds(), 1_600_000_000);
    }
}
