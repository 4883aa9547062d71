// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox Engine
//!
//! Maps a client-supplied path string onto the real filesystem so that the
//! result is provably inside the session root, or fails closed.
//!
//! Resolution is two-stage and both stages are required:
//!
//! 1. The request string is cleaned *before* it touches the root: separators
//!    are normalized, any drive designator and all leading separators are
//!    dropped, and `.`/`..` are collapsed inside the string itself. A leading
//!    `..` that cannot be collapsed survives this stage on purpose.
//! 2. The cleaned request is joined onto the root, made absolute lexically,
//!    and re-expressed relative to the root. A relative form whose first
//!    segment is `..` is an escape.
//!
//! All of this is lexical. Symlinks inside a sandbox are not followed here;
//! the filesystem sees the joined path as-is.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Path containment for every dispatched operation

use std::fs::DirBuilder;
use std::io;
use std::path::{self, Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::identity::IdentityRecord;

/// Directory mode used when provisioning a session root.
pub const ROOT_DIR_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("access denied: {requested:?} escapes sandbox root {root}")]
    Escape { requested: String, root: PathBuf },

    #[error("access denied: sandbox root for {username:?} would fall outside base root {base}")]
    RootOutsideBase { username: String, base: PathBuf },

    #[error("access denied: path contains a NUL byte")]
    NulByte,

    #[error("path resolution failed: {0}")]
    Resolution(#[from] io::Error),
}

impl SandboxError {
    /// Escapes and malformed requests are access denials; I/O trouble while
    /// computing absolute paths is not.
    pub fn is_denial(&self) -> bool {
        !matches!(self, SandboxError::Resolution(_))
    }
}

/// Absolute, normalized sandbox root bound to one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionRoot(PathBuf);

impl SessionRoot {
    /// Wrap an already-absolute root. Relative input is made absolute against
    /// the working directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        Ok(Self(absolutize(root.as_ref())?))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// A path proven to lie inside a [`SessionRoot`] (root inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: PathBuf,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// Position inside the sandbox; empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.absolute
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

/// Derives session roots under a shared base directory and resolves requests
/// against them.
#[derive(Debug, Clone)]
pub struct SandboxResolver {
    base_root: PathBuf,
}

impl SandboxResolver {
    pub fn new(base_root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        Ok(Self {
            base_root: absolutize(base_root.as_ref())?,
        })
    }

    pub fn base_root(&self) -> &Path {
        &self.base_root
    }

    /// Effective root for `identity`.
    ///
    /// An empty configured root becomes `<base-root>/<username>`. A configured
    /// root outside the base root is replaced by that derived path.
    pub fn session_root(&self, identity: &IdentityRecord) -> Result<SessionRoot, SandboxError> {
        if !is_single_segment(&identity.username) {
            warn!(username = %identity.username, "Username cannot name a sandbox directory");
            return Err(SandboxError::RootOutsideBase {
                username: identity.username.clone(),
                base: self.base_root.clone(),
            });
        }
        let derived = self.base_root.join(&identity.username);

        let configured = to_native_separators(identity.root_path.trim());
        if configured.is_empty() {
            return Ok(SessionRoot(derived));
        }

        let configured = absolutize(Path::new(&configured))?;
        if is_within(&self.base_root, &configured) {
            Ok(SessionRoot(configured))
        } else {
            warn!(
                username = %identity.username,
                configured = %configured.display(),
                rebased = %derived.display(),
                "User root is outside the base root; rebasing"
            );
            Ok(SessionRoot(derived))
        }
    }

    /// Resolve `requested` under `root`, creating the root first if needed.
    pub fn resolve(&self, root: &SessionRoot, requested: &str) -> Result<ResolvedPath, SandboxError> {
        provision_root(root);
        resolve_within(root, requested)
    }
}

/// Best-effort creation of the session root. Failure is logged only.
pub fn provision_root(root: &SessionRoot) {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(ROOT_DIR_MODE);
    }
    if let Err(e) = builder.create(root.as_path()) {
        warn!(root = %root.as_path().display(), error = %e, "Failed to create user root directory");
    }
}

/// Pure resolution of `requested` against an existing session root.
pub fn resolve_within(root: &SessionRoot, requested: &str) -> Result<ResolvedPath, SandboxError> {
    if requested.contains('\0') {
        warn!(requested = %requested.escape_debug(), "Rejected path containing NUL byte");
        return Err(SandboxError::NulByte);
    }

    let cleaned = clean_request(requested);
    let joined = if cleaned.as_os_str().is_empty() {
        root.as_path().to_path_buf()
    } else {
        root.as_path().join(&cleaned)
    };
    let absolute = absolutize(&joined)?;

    let relative = match relative_to(root.as_path(), &absolute) {
        Some(rel) if !starts_with_parent(&rel) => rel,
        _ => {
            warn!(
                requested = %requested,
                resolved = %absolute.display(),
                root = %root.as_path().display(),
                "Attempt to escape sandbox root"
            );
            return Err(SandboxError::Escape {
                requested: requested.to_string(),
                root: root.as_path().to_path_buf(),
            });
        }
    };

    let relative = if relative == Path::new(".") {
        PathBuf::new()
    } else {
        relative
    };
    debug!(requested = %requested, resolved = %absolute.display(), "Resolved sandbox path");
    Ok(ResolvedPath { absolute, relative })
}

/// Stage one: turn a client string into a cleaned root-relative path.
///
/// `"/"`, `""` and `"."` all clean to the empty path (the root). Leading `..`
/// segments that have nothing to cancel are kept for the containment check.
pub fn clean_request(requested: &str) -> PathBuf {
    let native = to_native_separators(requested);
    let relative = strip_volume(&native).trim_start_matches(path::is_separator);

    let mut segments: Vec<&str> = Vec::new();
    for segment in relative.split(path::is_separator) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            name => segments.push(name),
        }
    }
    segments.into_iter().collect()
}

/// Lexical normalization: drops `.`, folds `name/..`, and keeps `..` at the
/// filesystem root pinned to the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// `target` expressed relative to `base`, both normalized lexically.
///
/// Returns `None` when the two do not share a root (different drives, or one
/// side relative). Identical paths yield `"."`.
pub fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();

    fn anchor<'a>(c: &[Component<'a>]) -> Vec<Component<'a>> {
        c.iter()
            .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
            .copied()
            .collect()
    }
    if anchor(&base) != anchor(&target) {
        return None;
    }

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Some(rel)
}

/// True when `path` is `base` or lies beneath it.
pub fn is_within(base: &Path, path: &Path) -> bool {
    relative_to(base, path).is_some_and(|rel| !starts_with_parent(&rel))
}

fn starts_with_parent(rel: &Path) -> bool {
    matches!(rel.components().next(), Some(Component::ParentDir))
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&joined))
}

fn to_native_separators(s: &str) -> String {
    if path::MAIN_SEPARATOR == '/' {
        s.to_string()
    } else {
        s.replace('/', path::MAIN_SEPARATOR_STR)
    }
}

#[cfg(windows)]
fn strip_volume(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &s[2..]
    } else {
        s
    }
}

#[cfg(not(windows))]
fn strip_volume(s: &str) -> &str {
    s
}

fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(n)), None) if n == name
    )
}
