// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Permission Model
//!
//! A principal's rights are a bitmask over four independent capabilities:
//!
//! | Capability | Bit |
//! |------------|-----|
//! | `read`     | 1   |
//! | `list`     | 2   |
//! | `write`    | 4   |
//! | `delete`   | 8   |
//!
//! Masks are combined with `|`. Bits outside the known set are dropped on
//! construction so a stored value such as `0xF3` can never grant anything
//! beyond `read | list`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// A single grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    List,
    Write,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Read,
        Capability::List,
        Capability::Write,
        Capability::Delete,
    ];

    /// Bit value as stored in the user directory.
    pub const fn bit(self) -> u8 {
        match self {
            Capability::Read => 1 << 0,
            Capability::List => 1 << 1,
            Capability::Write => 1 << 2,
            Capability::Delete => 1 << 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::List => "list",
            Capability::Write => "write",
            Capability::Delete => "delete",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("unknown capability name: {0}")]
    UnknownCapability(String),
}

impl FromStr for Capability {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Capability::Read),
            "list" => Ok(Capability::List),
            "write" => Ok(Capability::Write),
            "delete" => Ok(Capability::Delete),
            other => Err(PermissionParseError::UnknownCapability(other.to_string())),
        }
    }
}

/// Granted capability mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u8);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const READ: Permissions = Permissions(Capability::Read.bit());
    pub const LIST: Permissions = Permissions(Capability::List.bit());
    pub const WRITE: Permissions = Permissions(Capability::Write.bit());
    pub const DELETE: Permissions = Permissions(Capability::Delete.bit());
    pub const ALL: Permissions = Permissions(0b1111);

    /// Build a mask from a raw stored value. Unknown bits are discarded.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Every listed capability must be granted. An empty list is granted.
    pub fn allows_all(self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.contains(*c))
    }

    /// At least one listed capability must be granted. An empty list is denied.
    pub fn allows_any(self, candidates: &[Capability]) -> bool {
        candidates.iter().any(|c| self.contains(*c))
    }

    pub fn capabilities(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Does `granted` include `required`?
pub fn authorize(granted: Permissions, required: Capability) -> bool {
    granted.contains(required)
}

impl From<Capability> for Permissions {
    fn from(capability: Capability) -> Self {
        Permissions(capability.bit())
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOr<Capability> for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Capability) -> Self::Output {
        Permissions(self.0 | rhs.bit())
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<Capability> for Permissions {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Permissions::NONE, |mask, capability| mask | capability)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.capabilities().map(Capability::name).collect();
        f.write_str(&names.join("|"))
    }
}

/// Requirement an operation places on the granted mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Conjunctive: all capabilities must be granted.
    AllOf(&'static [Capability]),
    /// Disjunctive: any one capability suffices.
    AnyOf(&'static [Capability]),
}

impl Requirement {
    pub fn is_satisfied_by(&self, granted: Permissions) -> bool {
        match self {
            Requirement::AllOf(caps) => granted.allows_all(caps),
            Requirement::AnyOf(caps) => granted.allows_any(caps),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (caps, sep) = match self {
            Requirement::AllOf(caps) => (caps, " and "),
            Requirement::AnyOf(caps) => (caps, " or "),
        };
        let names: Vec<&str> = caps.iter().map(|c| c.name()).collect();
        f.write_str(&names.join(sep))
    }
}

// Stored as the raw number; configuration may also spell out names.
impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bits(u64),
            Names(Vec<String>),
            Joined(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bits(bits) => Ok(Permissions::from_bits_truncate((bits & 0xFF) as u8)),
            Repr::Names(names) => parse_names(names.iter().map(String::as_str)),
            Repr::Joined(joined) => parse_names(joined.split(['|', ','])),
        }
    }
}

fn parse_names<'a, E: serde::de::Error>(
    names: impl Iterator<Item = &'a str>,
) -> Result<Permissions, E> {
    names
        .filter(|n| !n.trim().is_empty())
        .map(Capability::from_str)
        .collect::<Result<Permissions, _>>()
        .map_err(E::custom)
}
