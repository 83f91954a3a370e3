use super::DriverError;
use crate::bulk::BulkBuilder;
use crate::client::{Operation, RunSqlArgs, RunSqlStyle};
use crate::migration::{MigrationKind, MigrationVersion};
use crate::state::VersionChange;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Releases the driver lock when the session goes away, committed or not.
#[derive(Debug)]
pub(super) struct LockGuard(Arc<AtomicBool>);

impl LockGuard {
    /// Take the lock, or `None` if it is held.
    pub(super) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Operations accumulated between [`Driver::lock`](super::Driver::lock) and
/// [`Driver::unlock`](super::Driver::unlock). Nothing reaches the server
/// until the session is committed.
#[derive(Debug)]
pub struct BulkSession {
    pub(super) bulk: BulkBuilder,
    pub(super) changes: Vec<VersionChange>,
    style: RunSqlStyle,
    disable_consistency_check: bool,
    _guard: LockGuard,
}

impl BulkSession {
    pub(super) fn new(style: RunSqlStyle, disable_consistency_check: bool, guard: LockGuard) -> Self {
        Self {
            bulk: BulkBuilder::new(),
            changes: Vec::new(),
            style,
            disable_consistency_check,
            _guard: guard,
        }
    }

    /// Stage the content of one migration file.
    ///
    /// SQL becomes a single `run_sql`; empty SQL stages nothing. Metadata must
    /// be a YAML list of operations, each staged on its own. On a parse error
    /// everything staged so far is discarded.
    pub fn run(&mut self, content: &str, kind: MigrationKind, file: &str) -> Result<(), DriverError> {
        match kind {
            MigrationKind::Sql => {
                if content.trim().is_empty() {
                    debug!(file = %file, "Skipping empty SQL migration");
                    return Ok(());
                }
                let mut args = RunSqlArgs::new(content);
                if self.disable_consistency_check {
                    args.check_metadata_consistency = Some(false);
                }
                self.bulk.append(self.style.operation(args), file);
            }
            MigrationKind::Metadata => match parse_metadata(content) {
                Ok(operations) => {
                    for operation in operations {
                        self.bulk.append(operation, file);
                    }
                }
                Err(message) => {
                    self.reset();
                    return Err(DriverError::ParseError {
                        file: file.to_string(),
                        message,
                    });
                }
            },
        }
        Ok(())
    }

    /// Record `version` as applied when the session is committed.
    pub fn insert_version(&mut self, version: MigrationVersion, name: Option<&str>) {
        self.changes.push(VersionChange::Insert {
            version,
            name: name.map(str::to_string),
        });
    }

    /// Record `version` as rolled back when the session is committed.
    pub fn remove_version(&mut self, version: MigrationVersion) {
        self.changes.push(VersionChange::Remove(version));
    }

    /// Whether committing would send nothing.
    pub fn is_empty(&self) -> bool {
        self.bulk.is_empty() && self.changes.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        self.bulk.operations()
    }

    pub fn changes(&self) -> &[VersionChange] {
        &self.changes
    }

    /// Discard staged operations and bookkeeping. The session stays open.
    pub fn reset(&mut self) {
        self.bulk.reset();
        self.changes.clear();
    }
}

fn parse_metadata(content: &str) -> Result<Vec<Operation>, String> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_yaml::from_value(item).map_err(|e| format!("operation {}: {}", i, e))
            })
            .collect(),
        _ => Err("expected a list of metadata operations".to_string()),
    }
}
