use super::types::MigrationVersion;
use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Unbounded};

/// Ordered, gap-tolerant set of migration versions.
///
/// Built wholesale from a scan; lookups never mutate it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Migrations {
    versions: BTreeSet<MigrationVersion>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, version: MigrationVersion) -> bool {
        self.versions.insert(version)
    }

    pub fn remove(&mut self, version: MigrationVersion) -> bool {
        self.versions.remove(&version)
    }

    /// Smallest known version.
    pub fn first(&self) -> Option<MigrationVersion> {
        self.versions.first().copied()
    }

    /// Largest known version.
    pub fn last(&self) -> Option<MigrationVersion> {
        self.versions.last().copied()
    }

    /// Smallest known version strictly greater than `version`.
    pub fn next(&self, version: MigrationVersion) -> Option<MigrationVersion> {
        self.versions
            .range((Excluded(version), Unbounded))
            .next()
            .copied()
    }

    /// Largest known version strictly less than `version`.
    pub fn prev(&self, version: MigrationVersion) -> Option<MigrationVersion> {
        self.versions.range(..version).next_back().copied()
    }

    /// Whether `version` is known.
    pub fn read(&self, version: MigrationVersion) -> bool {
        self.versions.contains(&version)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versions in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = MigrationVersion> + '_ {
        self.versions.iter().copied()
    }
}

impl FromIterator<MigrationVersion> for Migrations {
    fn from_iter<I: IntoIterator<Item = MigrationVersion>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}
