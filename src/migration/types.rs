//! Types for the local migration files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Millisecond timestamp taken when the migration was created.
pub type MigrationVersion = u64;

/// Error types for local migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Migrations directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read migrations directory: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Migration {0} not found in the migrations directory")]
    VersionNotFound(MigrationVersion),

    #[error("Invalid migration name: {0}")]
    InvalidName(String),

    #[error("Migration {0} already exists")]
    AlreadyExists(PathBuf),
}

/// Direction of migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration.
    Up,
    /// Roll the migration back.
    Down,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a migration file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MigrationKind {
    /// Raw SQL, sent as one `run_sql`
    Sql,
    /// YAML list of metadata operations
    Metadata,
}

impl MigrationKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "sql" => Some(MigrationKind::Sql),
            "yaml" | "yml" => Some(MigrationKind::Metadata),
            _ => None,
        }
    }
}

/// One migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: MigrationVersion,
    pub name: String,
    pub direction: MigrationDirection,
    pub kind: MigrationKind,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Name used to attribute errors, relative to the migrations directory.
    pub fn file_name(&self) -> String {
        let file = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Directory layout: <version>_<name>/up.sql
        if file.starts_with("up.") || file.starts_with("down.") {
            if let Some(dir) = self.path.parent().and_then(|p| p.file_name()) {
                return format!("{}/{}", dir.to_string_lossy(), file);
            }
        }
        file
    }
}
