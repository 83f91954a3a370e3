pub mod bulk;
pub mod catalog;
pub mod client;
pub mod config;
pub mod driver;
pub mod metadata;
pub mod migration;
pub mod seed;
pub mod state;
pub mod utils;
pub mod version;

// Re-export commonly used types
pub use bulk::{attribute_error, AttributedError, BulkBuilder};
pub use catalog::{CatalogError, CatalogState, CatalogStore, CliState, MigrationRecord};
pub use client::{ApiError, HasuraError, HttpTransport, Operation, Transport, TransportError};
pub use config::{read_config, write_config, ConfigError, DatabaseDriver, ProjectConfig};
pub use driver::{
    apply_migrations, build_plan, migration_status, AppliedMigration, ApplyOptions, ApplyResult,
    BulkSession, Driver, DriverError, DriverOptions, MigrationPlan, MigrationStatus,
    MigrationTarget, PlanError,
};
pub use metadata::{MetadataClient, MetadataError};
pub use migration::{
    create_migration, CreateMigrationOptions, FileSource, MigrationDirection, MigrationError,
    MigrationKind, MigrationVersion, Migrations,
};
pub use seed::{apply_seeds, create_seed, SeedError, SeedTarget};
pub use state::{
    CatalogStateBackend, CommitBatch, MigrationStateBackend, SqlTableBackend, StateError,
};
pub use version::{detect_capability, probe_server, SemVer, ServerCapability, VersionError};
