//! Catalog state store: the engine-side JSON blob where modern servers keep
//! the list of applied migrations and the migration settings.

mod store;
mod types;

pub use store::CatalogStore;
pub use types::{
    CatalogError, CatalogState, CliState, CliStateV1, MigrationRecord, MigrationSettings,
    VersionedCliState, CLI_STATE_VERSION, DEFAULT_MIGRATION_MODE,
};
