use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier a record holds in one database.
///
/// In a [`Document`](crate::Document) the stable key is the record's key in
/// the source database. It is only meaningful for resolving references
/// during one export/import cycle and is never carried over as a permanent
/// identifier: the destination store assigns its own keys on insert.
///
/// Keys are unique within a kind, not across kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableKey(u64);

impl StableKey {
    /// Placeholder carried by records that have not been inserted yet.
    pub const UNASSIGNED: Self = Self(0);

    /// Wrap a raw key.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric key.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for the [`UNASSIGNED`](Self::UNASSIGNED) placeholder.
    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableKey({})", self.0)
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StableKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl FromStr for StableKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('#').unwrap_or(s);
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| TypeError::InvalidKey(format!("{s}: {e}")))
    }
}
