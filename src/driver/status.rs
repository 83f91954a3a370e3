use crate::migration::{FileSource, MigrationVersion, Migrations};
use serde::Serialize;
use std::collections::BTreeSet;

/// One row of `migrate status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: MigrationVersion,
    pub name: Option<String>,
    /// A file exists locally
    pub source_present: bool,
    /// The version is recorded as applied on the server
    pub database_present: bool,
}

/// Join the local files with the applied versions, ascending by version.
pub fn migration_status(source: &FileSource, applied: &Migrations) -> Vec<MigrationStatus> {
    let versions: BTreeSet<MigrationVersion> = source.versions().chain(applied.iter()).collect();

    versions
        .into_iter()
        .map(|version| MigrationStatus {
            version,
            name: source.name(version).map(str::to_string),
            source_present: source.contains(version),
            database_present: applied.read(version),
        })
        .collect()
}
