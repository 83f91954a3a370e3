use crate::migration::{FileSource, MigrationDirection, MigrationFile, MigrationVersion, Migrations};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Migration {0} not found in the migrations directory")]
    VersionNotFound(MigrationVersion),

    #[error("Migration {0} is applied but not present locally, cannot roll it back")]
    NoDownMigration(MigrationVersion),

    #[error("Migration {0} is already applied")]
    AlreadyApplied(MigrationVersion),

    #[error("Migration {0} is not applied")]
    NotApplied(MigrationVersion),
}

/// Where to take the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Apply pending migrations, all of them or the next `n`
    Up(Option<usize>),
    /// Roll back applied migrations, all of them or the last `n`
    Down(Option<usize>),
    /// Apply or roll back until exactly the versions up to this one are applied
    Goto(MigrationVersion),
    /// Apply or roll back a single version
    Version(MigrationVersion, MigrationDirection),
}

/// One version to apply or roll back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub version: MigrationVersion,
    pub name: Option<String>,
    pub direction: MigrationDirection,
    /// Empty for a version without a down file: only its bookkeeping changes
    pub files: Vec<MigrationFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Order the transitions needed to reach `target`, given the local files and
/// the versions applied on the server. Up steps are ascending, down steps
/// descending; a `Goto` rolls back before it applies.
pub fn build_plan(
    source: &FileSource,
    applied: &Migrations,
    target: MigrationTarget,
) -> Result<MigrationPlan, PlanError> {
    let mut steps = Vec::new();

    match target {
        MigrationTarget::Up(limit) => {
            let pending = source.up().iter().filter(|v| !applied.read(*v));
            for version in pending.take(limit.unwrap_or(usize::MAX)) {
                steps.push(step(source, version, MigrationDirection::Up)?);
            }
        }
        MigrationTarget::Down(limit) => {
            for version in applied.iter().rev().take(limit.unwrap_or(usize::MAX)) {
                steps.push(step(source, version, MigrationDirection::Down)?);
            }
        }
        MigrationTarget::Goto(target) => {
            if !source.contains(target) {
                return Err(PlanError::VersionNotFound(target));
            }
            for version in applied.iter().rev().filter(|v| *v > target) {
                steps.push(step(source, version, MigrationDirection::Down)?);
            }
            for version in source
                .up()
                .iter()
                .filter(|v| *v <= target && !applied.read(*v))
            {
                steps.push(step(source, version, MigrationDirection::Up)?);
            }
        }
        MigrationTarget::Version(version, MigrationDirection::Up) => {
            if applied.read(version) {
                return Err(PlanError::AlreadyApplied(version));
            }
            steps.push(step(source, version, MigrationDirection::Up)?);
        }
        MigrationTarget::Version(version, MigrationDirection::Down) => {
            if !applied.read(version) {
                return Err(PlanError::NotApplied(version));
            }
            steps.push(step(source, version, MigrationDirection::Down)?);
        }
    }

    Ok(MigrationPlan { steps })
}

fn step(
    source: &FileSource,
    version: MigrationVersion,
    direction: MigrationDirection,
) -> Result<PlanStep, PlanError> {
    let files = source.files(version, direction).to_vec();

    match direction {
        MigrationDirection::Up if files.is_empty() => {
            return Err(PlanError::VersionNotFound(version));
        }
        MigrationDirection::Down if !source.contains(version) => {
            return Err(PlanError::NoDownMigration(version));
        }
        MigrationDirection::Down if files.is_empty() => {
            warn!(version, "No down migration found, only removing the version");
        }
        _ => {}
    }

    Ok(PlanStep {
        version,
        name: source.name(version).map(str::to_string),
        direction,
        files,
    })
}
