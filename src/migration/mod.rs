//! Local migration files.
//!
//! - [`FileSource`] scans a migrations directory and keeps one
//!   [`Migrations`] index per direction
//! - [`create_migration`] writes a new pair of files
//!
//! File names follow `<version>_<name>.<up|down>.<sql|yaml>` or the
//! directory layout `<version>_<name>/<up|down>.<sql|yaml>`. The version is a
//! millisecond timestamp; gaps between versions are expected.

mod create;
mod index;
mod source;
mod types;

pub(crate) use create::validate_name;
pub use create::{create_migration, CreateMigrationOptions, CreateMigrationResult};
pub use index::Migrations;
pub use source::FileSource;
pub use types::{MigrationDirection, MigrationError, MigrationFile, MigrationKind, MigrationVersion};
