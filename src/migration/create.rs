use super::types::{MigrationDirection, MigrationError, MigrationVersion};
use crate::utils::now_millis;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Options for [`create_migration`].
#[derive(Debug, Clone, Default)]
pub struct CreateMigrationOptions {
    pub name: String,
    pub up_sql: String,
    /// No down file is written when `None`
    pub down_sql: Option<String>,
    /// Defaults to the current time in milliseconds
    pub version: Option<MigrationVersion>,
}

#[derive(Debug, Clone)]
pub struct CreateMigrationResult {
    pub version: MigrationVersion,
    pub up_path: PathBuf,
    pub down_path: Option<PathBuf>,
}

/// Write `<version>_<name>.up.sql` (and `.down.sql`) into the migrations directory.
pub async fn create_migration(
    migrations_dir: &Path,
    options: CreateMigrationOptions,
) -> Result<CreateMigrationResult, MigrationError> {
    validate_name(&options.name)?;

    let version = options.version.unwrap_or_else(now_millis);
    fs::create_dir_all(migrations_dir).await?;

    let up_path = file_path(migrations_dir, version, &options.name, MigrationDirection::Up);
    if fs::try_exists(&up_path).await? {
        return Err(MigrationError::AlreadyExists(up_path));
    }
    fs::write(&up_path, &options.up_sql).await?;

    let down_path = match &options.down_sql {
        Some(sql) => {
            let path = file_path(migrations_dir, version, &options.name, MigrationDirection::Down);
            fs::write(&path, sql).await?;
            Some(path)
        }
        None => None,
    };

    info!(version, name = %options.name, "Created migration");

    Ok(CreateMigrationResult {
        version,
        up_path,
        down_path,
    })
}

pub(crate) fn validate_name(name: &str) -> Result<(), MigrationError> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name.contains(char::is_whitespace) {
        return Err(MigrationError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn file_path(dir: &Path, version: MigrationVersion, name: &str, direction: MigrationDirection) -> PathBuf {
    dir.join(format!("{}_{}.{}.sql", version, name, direction))
}
