// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operation Requests
//!
//! The transport-neutral shape of a file operation. A transport builds one of
//! these per client request (usually via [`OperationRequest::from_method`])
//! and hands it to the dispatcher. Paths are the raw client strings; nothing
//! here has been resolved yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::domain::permission::{Capability, Requirement};

/// Attribute changes requested by a set-attributes operation.
///
/// Every field carries its own presence. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBundle {
    pub mode: Option<u32>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
}

impl AttributeBundle {
    pub fn is_empty(&self) -> bool {
        *self == AttributeBundle::default()
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_times(mut self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> Self {
        self.atime = atime;
        self.mtime = mtime;
        self
    }

    pub fn with_owner(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }
}

/// Attributes as some transports deliver them: plain numbers with no
/// per-field presence flags, where zero doubles as "absent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAttributes {
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub atime: u32,
    pub mtime: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl WireAttributes {
    /// Translate into an explicit bundle.
    ///
    /// Zero is read as "not provided" for every field. For size this means a
    /// client can never truncate to zero through this path; a zero that was
    /// meant literally is indistinguishable from an omitted size. Ownership is
    /// kept as a pair when either id is non-zero.
    pub fn into_bundle(self) -> AttributeBundle {
        let nonzero = |v: u32| (v != 0).then_some(v);
        let time = |secs: u32| {
            (secs != 0).then(|| UNIX_EPOCH + Duration::from_secs(u64::from(secs)))
        };
        let (uid, gid) = if self.uid == 0 && self.gid == 0 {
            (None, None)
        } else {
            (Some(self.uid), Some(self.gid))
        };

        AttributeBundle {
            mode: nonzero(self.mode),
            atime: time(self.atime),
            mtime: time(self.mtime),
            uid,
            gid,
            size: (self.size != 0).then_some(self.size),
        }
    }
}

/// One file operation on behalf of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Read { path: String },
    Write { path: String },
    List { path: String },
    Stat { path: String },
    Lstat { path: String },
    Remove { path: String },
    Rmdir { path: String },
    Rename { source: String, target: String },
    Mkdir { path: String },
    SetAttributes { path: String, attributes: AttributeBundle },
    /// A method name the gateway does not implement.
    Unsupported { method: String, path: String },
}

impl OperationRequest {
    /// Build a request from a transport method name.
    ///
    /// Recognized names: `Get`, `Put`, `List`, `Stat`, `Lstat`, `Remove`,
    /// `Rename`, `Mkdir`, `Rmdir`, `Setstat`. A rename without a target names
    /// the root. A set-attributes request without attributes changes nothing.
    pub fn from_method(
        method: &str,
        path: impl Into<String>,
        target: Option<&str>,
        attributes: Option<WireAttributes>,
    ) -> Self {
        let path = path.into();
        match method {
            "Get" => OperationRequest::Read { path },
            "Put" => OperationRequest::Write { path },
            "List" => OperationRequest::List { path },
            "Stat" => OperationRequest::Stat { path },
            "Lstat" => OperationRequest::Lstat { path },
            "Remove" => OperationRequest::Remove { path },
            "Rmdir" => OperationRequest::Rmdir { path },
            "Mkdir" => OperationRequest::Mkdir { path },
            "Rename" => OperationRequest::Rename {
                source: path,
                target: target.unwrap_or_default().to_string(),
            },
            "Setstat" => OperationRequest::SetAttributes {
                path,
                attributes: attributes.map(WireAttributes::into_bundle).unwrap_or_default(),
            },
            other => OperationRequest::Unsupported {
                method: other.to_string(),
                path,
            },
        }
    }

    /// Capabilities that must be granted before anything else happens.
    pub fn required(&self) -> Requirement {
        match self {
            OperationRequest::Read { .. } => Requirement::AllOf(&[Capability::Read]),
            OperationRequest::List { .. } => Requirement::AllOf(&[Capability::List]),
            OperationRequest::Stat { .. } | OperationRequest::Lstat { .. } => {
                Requirement::AnyOf(&[Capability::List, Capability::Read])
            }
            OperationRequest::Write { .. }
            | OperationRequest::Rename { .. }
            | OperationRequest::Mkdir { .. }
            | OperationRequest::SetAttributes { .. } => Requirement::AllOf(&[Capability::Write]),
            OperationRequest::Remove { .. } | OperationRequest::Rmdir { .. } => {
                Requirement::AllOf(&[Capability::Delete])
            }
            // Nothing can satisfy an empty disjunction.
            OperationRequest::Unsupported { .. } => Requirement::AnyOf(&[]),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            OperationRequest::Read { .. } => "Get",
            OperationRequest::Write { .. } => "Put",
            OperationRequest::List { .. } => "List",
            OperationRequest::Stat { .. } => "Stat",
            OperationRequest::Lstat { .. } => "Lstat",
            OperationRequest::Remove { .. } => "Remove",
            OperationRequest::Rmdir { .. } => "Rmdir",
            OperationRequest::Rename { .. } => "Rename",
            OperationRequest::Mkdir { .. } => "Mkdir",
            OperationRequest::SetAttributes { .. } => "Setstat",
            OperationRequest::Unsupported { method, .. } => method,
        }
    }

    /// Primary path (the source, for a rename).
    pub fn path(&self) -> &str {
        match self {
            OperationRequest::Read { path }
            | OperationRequest::Write { path }
            | OperationRequest::List { path }
            | OperationRequest::Stat { path }
            | OperationRequest::Lstat { path }
            | OperationRequest::Remove { path }
            | OperationRequest::Rmdir { path }
            | OperationRequest::Mkdir { path }
            | OperationRequest::SetAttributes { path, .. }
            | OperationRequest::Unsupported { path, .. } => path,
            OperationRequest::Rename { source, .. } => source,
        }
    }
}

impl fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationRequest::Rename { source, target } => {
                write!(f, "Rename {source:?} -> {target:?}")
            }
            other => write!(f, "{} {:?}", other.method(), other.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::Permissions;

    #[test]
    fn test_from_method_names() {
        assert!(matches!(
            OperationRequest::from_method("Get", "/a", None, None),
            OperationRequest::Read { .. }
        ));
        assert!(matches!(
            OperationRequest::from_method("Put", "/a", None, None),
            OperationRequest::Write { .. }
        ));
        let rename = OperationRequest::from_method("Rename", "/a", Some("/b"), None);
        assert_eq!(
            rename,
            OperationRequest::Rename {
                source: "/a".into(),
                target: "/b".into()
            }
        );
        let unknown = OperationRequest::from_method("Symlink", "/a", Some("/b"), None);
        assert_eq!(unknown.method(), "Symlink");
        assert!(matches!(unknown, OperationRequest::Unsupported { .. }));
    }

    #[test]
    fn test_requirements() {
        let read_only = Permissions::READ;
        let list_only = Permissions::LIST;
        let stat = OperationRequest::Stat { path: "/".into() };
        assert!(stat.required().is_satisfied_by(read_only));
        assert!(stat.required().is_satisfied_by(list_only));
        assert!(!stat.required().is_satisfied_by(Permissions::WRITE));

        let rmdir = OperationRequest::Rmdir { path: "/x".into() };
        assert!(!rmdir.required().is_satisfied_by(Permissions::WRITE));
        assert!(rmdir.required().is_satisfied_by(Permissions::DELETE));

        let unsupported = OperationRequest::from_method("Link", "/x", None, None);
        assert!(!unsupported.required().is_satisfied_by(Permissions::ALL));
    }

    #[test]
    fn test_wire_zero_means_absent() {
        let bundle = WireAttributes::default().into_bundle();
        assert!(bundle.is_empty());

        let bundle = WireAttributes {
            size: 0,
            mode: 0o100644,
            ..Default::default()
        }
        .into_bundle();
        assert_eq!(bundle.size, None);
        assert_eq!(bundle.mode, Some(0o100644));
    }

    #[test]
    fn test_wire_ownership_pair() {
        let bundle = WireAttributes {
            uid: 1000,
            gid: 0,
            ..Default::default()
        }
        .into_bundle();
        assert_eq!(bundle.uid, Some(1000));
        assert_eq!(bundle.gid, Some(0));
    }

    #[test]
    fn test_wire_times() {
        let bundle = WireAttributes {
            mtime: 1_700_000_000,
            ..Default::default()
        }
        .into_bundle();
        assert_eq!(bundle.atime, None);
        assert_eq!(
            bundle.mtime,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_setstat_without_attributes_is_empty() {
        match OperationRequest::from_method("Setstat", "/f", None, None) {
            OperationRequest::SetAttributes { attributes, .. } => assert!(attributes.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
