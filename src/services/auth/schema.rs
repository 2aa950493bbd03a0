//! Compact claim schema tables.
//!
//! The payload of an access token is dictionary compressed. This module owns the
//! tables that map the short forms back to full names, keyed by schema version:
//!
//! - v1: permissions are `"<domain>:<action>"` abbreviations (`"s:r"` → `"storage:read"`).
//! - v2: permissions are a bitmask over [`PERMISSION_CATALOG`]; bucket names may
//!   share a common prefix (`bp`).
//!
//! Bucket access levels are packed as bitmasks in both versions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Access level on a bucket. Ordered: `Read < Write < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

const MASK_READ: u64 = 0b001;
const MASK_WRITE: u64 = 0b010;
const MASK_ADMIN: u64 = 0b100;

impl AccessLevel {
    /// Highest set bit wins. `0` and bits above admin are rejected.
    pub fn from_mask(mask: u64) -> Option<Self> {
        if mask == 0 || mask > (MASK_READ | MASK_WRITE | MASK_ADMIN) {
            return None;
        }
        if mask & MASK_ADMIN != 0 {
            Some(Self::Admin)
        } else if mask & MASK_WRITE != 0 {
            Some(Self::Write)
        } else {
            Some(Self::Read)
        }
    }

    /// Cumulative mask (admin implies write implies read).
    pub fn mask(self) -> u64 {
        match self {
            Self::Read => MASK_READ,
            Self::Write => MASK_READ | MASK_WRITE,
            Self::Admin => MASK_READ | MASK_WRITE | MASK_ADMIN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown access level: {other}")),
        }
    }
}

/// Schema versions this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub const SUPPORTED: [SchemaVersion; 2] = [SchemaVersion::V1, SchemaVersion::V2];

    pub fn from_wire(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

// v1 dictionaries
const DOMAINS: &[(&str, &str)] = &[
    ("s", "storage"),
    ("p", "package"),
    ("q", "query"),
    ("f", "search"),
    ("v", "visualization"),
    ("a", "admin"),
    ("i", "identity"),
];

const ACTIONS: &[(&str, &str)] = &[
    ("r", "read"),
    ("w", "write"),
    ("c", "create"),
    ("u", "update"),
    ("d", "delete"),
    ("l", "list"),
    ("x", "execute"),
];

/// v2 permission catalog. Bit `n` of the `p` claim refers to entry `n`.
/// Append only: reordering breaks every issued v2 token.
pub const PERMISSION_CATALOG: &[&str] = &[
    "storage:read",
    "storage:write",
    "storage:delete",
    "package:read",
    "package:create",
    "package:update",
    "package:delete",
    "query:execute",
    "search:read",
    "visualization:create",
    "admin:read",
    "admin:write",
    "identity:read",
];

fn lookup<'a>(table: &'a [(&'a str, &'a str)], short: &str) -> Option<&'a str> {
    table.iter().find(|(s, _)| *s == short).map(|(_, full)| *full)
}

fn reverse_lookup<'a>(table: &'a [(&'a str, &'a str)], full: &str) -> Option<&'a str> {
    table.iter().find(|(_, f)| *f == full).map(|(short, _)| *short)
}

/// `"s:r"` → `"storage:read"`.
pub fn expand_permission(code: &str) -> Option<String> {
    let (domain, action) = code.split_once(':')?;
    let domain = lookup(DOMAINS, domain)?;
    let action = lookup(ACTIONS, action)?;
    Some(format!("{domain}:{action}"))
}

/// `"storage:read"` → `"s:r"`.
pub fn compact_permission(permission: &str) -> Option<String> {
    let (domain, action) = permission.split_once(':')?;
    let domain = reverse_lookup(DOMAINS, domain)?;
    let action = reverse_lookup(ACTIONS, action)?;
    Some(format!("{domain}:{action}"))
}

pub fn permissions_from_bits(bits: u64) -> Option<BTreeSet<String>> {
    let catalog_len = PERMISSION_CATALOG.len() as u32;
    if catalog_len < u64::BITS && bits >> catalog_len != 0 {
        return None;
    }

    Some(
        PERMISSION_CATALOG
            .iter()
            .enumerate()
            .filter(|(bit, _)| bits & (1u64 << bit) != 0)
            .map(|(_, name)| (*name).to_string())
            .collect(),
    )
}

pub fn permissions_to_bits<'a, I>(permissions: I) -> Option<u64>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut bits = 0u64;
    for permission in permissions {
        let bit = PERMISSION_CATALOG
            .iter()
            .position(|p| *p == permission.as_str())?;
        bits |= 1u64 << bit;
    }
    Some(bits)
}
