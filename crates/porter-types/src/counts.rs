use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::EntityKind;

/// Number of records per kind, in kind declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindCounts(BTreeMap<EntityKind, usize>);

impl KindCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: EntityKind, n: usize) {
        *self.0.entry(kind).or_default() += n;
    }

    pub fn increment(&mut self, kind: EntityKind) {
        self.add(kind, 1);
    }

    /// Count for `kind`; zero when never recorded.
    pub fn get(&self, kind: EntityKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Non-zero entries.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, usize)> + '_ {
        self.0.iter().filter(|(_, n)| **n > 0).map(|(k, n)| (*k, *n))
    }

    /// Copy with the given kinds removed.
    pub fn without(&self, kinds: &[EntityKind]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !kinds.contains(k))
                .map(|(k, n)| (*k, *n))
                .collect(),
        )
    }
}

impl FromIterator<(EntityKind, usize)> for KindCounts {
    fn from_iter<I: IntoIterator<Item = (EntityKind, usize)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (kind, n) in iter {
            counts.add(kind, n);
        }
        counts
    }
}

impl fmt::Display for KindCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, n)| format!("{}: {n}", k.label())).collect();
        write!(f, "{}", parts.join(", "))
    }
}
