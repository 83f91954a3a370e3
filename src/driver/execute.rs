use super::plan::{build_plan, MigrationTarget};
use super::{Driver, DriverError};
use crate::migration::{FileSource, MigrationDirection, MigrationVersion};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute the plan without touching the server
    pub dry_run: bool,
    /// Only update bookkeeping, do not run the files
    pub skip_execution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: MigrationVersion,
    pub name: Option<String>,
    pub direction: MigrationDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    /// In execution order. For a dry run, what would have been applied.
    pub migrations: Vec<AppliedMigration>,
    pub dry_run: bool,
}

/// Bring the server to `target`: plan against the applied versions, run
/// every step in one session and commit it as a single bulk.
pub async fn apply_migrations(
    driver: &mut Driver,
    source: &FileSource,
    target: MigrationTarget,
    options: ApplyOptions,
) -> Result<ApplyResult, DriverError> {
    driver.scan().await?;
    let plan = build_plan(source, driver.applied(), target)?;

    let migrations: Vec<AppliedMigration> = plan
        .steps
        .iter()
        .map(|step| AppliedMigration {
            version: step.version,
            name: step.name.clone(),
            direction: step.direction,
        })
        .collect();

    if plan.is_empty() {
        info!("Database is up to date");
        return Ok(ApplyResult {
            migrations,
            dry_run: options.dry_run,
        });
    }

    if options.dry_run {
        info!(count = plan.len(), "Dry run, nothing applied");
        return Ok(ApplyResult {
            migrations,
            dry_run: true,
        });
    }

    let mut session = driver.lock()?;
    for step in &plan.steps {
        info!(
            version = step.version,
            direction = %step.direction,
            "Staging migration"
        );

        if !options.skip_execution {
            for file in &step.files {
                let content = source.read(file).await?;
                session.run(&content, file.kind, &file.file_name())?;
            }
        }

        match step.direction {
            MigrationDirection::Up => session.insert_version(step.version, step.name.as_deref()),
            MigrationDirection::Down => session.remove_version(step.version),
        }
    }
    driver.unlock(session).await?;

    info!(count = migrations.len(), "Migrations applied");
    Ok(ApplyResult {
        migrations,
        dry_run: false,
    })
}
