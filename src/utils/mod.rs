use std::path::{Path, PathBuf};

/// The name of the project config file
pub const CONFIG_FILE: &str = "config.yaml";

/// Default directory for migration files
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default directory for seed files
pub const DEFAULT_SEEDS_DIR: &str = "seeds";

/// Default directory for exported metadata
pub const DEFAULT_METADATA_DIR: &str = "metadata";

/// File name used for exported metadata
pub const METADATA_FILE: &str = "metadata.json";

/// Schema holding the engine's own bookkeeping tables
pub const CATALOG_SCHEMA: &str = "hdb_catalog";

/// Name of the migration tracking table / cli state key
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Name of the settings table / cli state key
pub const SETTINGS_TABLE: &str = "migration_settings";

/// Get the path to the config file of a project
pub fn get_config_path(project_path: &Path) -> PathBuf {
    project_path.join(CONFIG_FILE)
}

/// Current time as milliseconds since the epoch, used as a migration version
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Quote a string for inclusion in a SQL literal
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
