//! Reconciliation engine.
//!
//! The [`Driver`] knows which versions are applied on the server and turns
//! local migration files into one atomic bulk request per session:
//!
//! ```ignore
//! let mut driver = Driver::open(transport, &config, None).await?;
//! let mut session = driver.lock()?;
//! session.run(&sql, MigrationKind::Sql, "1000_init.up.sql")?;
//! session.insert_version(1000, Some("init"));
//! driver.unlock(session).await?;
//! ```
//!
//! A session is committed as one bulk per endpoint, sent in order. On legacy
//! servers that is a single `v1/query` bulk. On servers with datasources,
//! schema SQL goes to `v2/query` and metadata to `v1/metadata`; the catalog
//! state write is staged last so it is only sent once everything before it
//! was accepted. Bulks are atomic individually, not across endpoints: when a
//! later bulk fails, the earlier ones stay applied and no version is recorded.

mod execute;
mod plan;
mod session;
mod status;

pub use execute::{apply_migrations, AppliedMigration, ApplyOptions, ApplyResult};
pub use plan::{build_plan, MigrationPlan, MigrationTarget, PlanError, PlanStep};
pub use session::BulkSession;
pub use status::{migration_status, MigrationStatus};

use crate::bulk::{attribute_error, BulkBuilder};
use crate::client::{post, ApiError, Transport, TransportError};
use crate::config::ProjectConfig;
use crate::migration::{MigrationError, MigrationVersion, Migrations};
use crate::state::{
    open_backend, BackendKind, CommitBatch, MigrationStateBackend, StateError, VersionChange,
};
use crate::version::{detect_capability, ServerCapability, VersionError};
use serde_json::Value;
use session::LockGuard;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("A bulk session is already open")]
    AlreadyLocked,

    #[error("Failed to parse {file}: {message}")]
    ParseError { file: String, message: String },

    #[error("Migration failed{}: [{code}] {message}", file_suffix(.file))]
    MigrationFailed {
        file: Option<String>,
        path: String,
        code: String,
        message: String,
        /// JSON of the failing operation, when the error path resolves
        query: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn file_suffix(file: &Option<String>) -> String {
    file.as_ref()
        .map(|f| format!(" in {}", f))
        .unwrap_or_default()
}

/// Map a failed commit to the file that caused it.
pub(crate) fn commit_error(error: ApiError, request: &Value, bulk: &BulkBuilder) -> DriverError {
    match attribute_error(&error, request, bulk) {
        Some(attributed) => DriverError::MigrationFailed {
            file: attributed.file,
            path: attributed.error.path,
            code: attributed.error.code,
            message: attributed.error.error,
            query: attributed.query,
        },
        None => DriverError::Api(error),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Send `check_metadata_consistency: false` with every `run_sql`
    pub disable_metadata_consistency_check: bool,
}

impl From<&ProjectConfig> for DriverOptions {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            disable_metadata_consistency_check: config.disable_metadata_consistency_check,
        }
    }
}

pub struct Driver {
    transport: Arc<dyn Transport>,
    backend: Box<dyn MigrationStateBackend>,
    applied: Migrations,
    lock: Arc<AtomicBool>,
    options: DriverOptions,
}

impl Driver {
    /// Detect the server capability (unless overridden), prepare the tracking
    /// storage and read the applied versions.
    pub async fn open(
        transport: Arc<dyn Transport>,
        config: &ProjectConfig,
        capability: Option<ServerCapability>,
    ) -> Result<Self, DriverError> {
        let capability =
            detect_capability(transport.as_ref(), &config.api_paths.version, capability).await?;
        let backend = open_backend(capability, Arc::clone(&transport), config);
        Self::with_backend(transport, backend, DriverOptions::from(config)).await
    }

    /// Open with an explicit backend.
    pub async fn with_backend(
        transport: Arc<dyn Transport>,
        mut backend: Box<dyn MigrationStateBackend>,
        options: DriverOptions,
    ) -> Result<Self, DriverError> {
        backend.prepare().await?;

        let mut driver = Self {
            transport,
            backend,
            applied: Migrations::new(),
            lock: Arc::new(AtomicBool::new(false)),
            options,
        };
        driver.scan().await?;
        Ok(driver)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Replace the applied index with what the server reports.
    pub async fn scan(&mut self) -> Result<(), DriverError> {
        let records = self.backend.applied_versions().await?;
        self.applied = records.iter().map(|r| r.version).collect();
        debug!(applied = self.applied.len(), "Scanned applied migrations");
        Ok(())
    }

    /// Open a session. Fails while another session is alive.
    pub fn lock(&self) -> Result<BulkSession, DriverError> {
        let guard = LockGuard::acquire(&self.lock).ok_or(DriverError::AlreadyLocked)?;
        Ok(BulkSession::new(
            self.backend.run_sql_style(),
            self.options.disable_metadata_consistency_check,
            guard,
        ))
    }

    /// Commit a session. An empty session sends nothing.
    pub async fn unlock(&mut self, mut session: BulkSession) -> Result<(), DriverError> {
        if session.is_empty() {
            debug!("Nothing to commit");
            return Ok(());
        }

        let changes = std::mem::take(&mut session.changes);
        if !changes.is_empty() {
            if let Err(e) = self
                .backend
                .stage_bookkeeping(&changes, &mut session.bulk)
                .await
            {
                self.backend.aborted();
                return Err(e.into());
            }
        }

        let batches = self
            .backend
            .split_commit(std::mem::take(&mut session.bulk));
        if let Err(e) = self.send_batches(&batches).await {
            self.backend.aborted();
            return Err(e);
        }

        self.backend.committed();
        for change in &changes {
            match change {
                VersionChange::Insert { version, .. } => self.applied.append(*version),
                VersionChange::Remove(version) => self.applied.remove(*version),
            };
        }
        Ok(())
    }

    async fn send_batches(&self, batches: &[CommitBatch]) -> Result<(), DriverError> {
        for (i, batch) in batches.iter().enumerate() {
            let request = batch.request()?;
            info!(
                operations = batch.bulk.len(),
                path = %batch.path,
                "Committing bulk"
            );

            let response = post(self.transport.as_ref(), &batch.path, &request).await?;
            if let Err(e) = response.error_for_status() {
                let error = commit_error(e, &request, &batch.bulk);
                if i > 0 {
                    warn!(
                        committed = i,
                        "Earlier bulks of this commit were applied, versions were not recorded"
                    );
                }
                error!(error = %error, path = %batch.path, "Bulk commit failed");
                return Err(error);
            }
        }
        Ok(())
    }

    /// Record `version` as applied without running anything.
    pub async fn insert_version(
        &mut self,
        version: MigrationVersion,
        name: Option<&str>,
    ) -> Result<(), DriverError> {
        let mut session = self.lock()?;
        session.insert_version(version, name);
        self.unlock(session).await
    }

    /// Record `version` as not applied without running anything.
    pub async fn remove_version(&mut self, version: MigrationVersion) -> Result<(), DriverError> {
        let mut session = self.lock()?;
        session.remove_version(version);
        self.unlock(session).await
    }

    /// Latest applied version. Migrations are never left dirty: a failed
    /// bulk changes nothing.
    pub fn version(&self) -> (Option<MigrationVersion>, bool) {
        (self.applied.last(), false)
    }

    pub fn applied(&self) -> &Migrations {
        &self.applied
    }

    pub fn first(&self) -> Option<MigrationVersion> {
        self.applied.first()
    }

    pub fn last(&self) -> Option<MigrationVersion> {
        self.applied.last()
    }

    pub fn next(&self, version: MigrationVersion) -> Option<MigrationVersion> {
        self.applied.next(version)
    }

    pub fn prev(&self, version: MigrationVersion) -> Option<MigrationVersion> {
        self.applied.prev(version)
    }

    pub fn read(&self, version: MigrationVersion) -> bool {
        self.applied.read(version)
    }

    pub async fn get_setting(&mut self, name: &str) -> Result<String, DriverError> {
        Ok(self.backend.get_setting(name).await?)
    }

    pub async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), DriverError> {
        Ok(self.backend.update_setting(name, value).await?)
    }
}
