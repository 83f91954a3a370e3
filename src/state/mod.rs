//! Where the server keeps track of applied migrations.
//!
//! Servers before datasource support use the `hdb_catalog.schema_migrations`
//! and `hdb_catalog.migration_settings` tables ([`SqlTableBackend`]). Newer
//! servers keep the same information in the cli catalog state
//! ([`CatalogStateBackend`]). The backend is picked once, when the driver is
//! opened.

mod catalog_state;
mod sql_table;

pub use catalog_state::CatalogStateBackend;
pub use sql_table::SqlTableBackend;

use crate::bulk::BulkBuilder;
use crate::catalog::{CatalogError, MigrationRecord, DEFAULT_MIGRATION_MODE};
use crate::client::{ApiError, RunSqlStyle, Transport, TransportError};
use crate::config::ProjectConfig;
use crate::migration::MigrationVersion;
use crate::version::ServerCapability;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Invalid row in {table}: {row}")]
    InvalidRow { table: String, row: String },
}

/// One request of a commit: a bulk for a single endpoint.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub path: String,
    /// Set for `v2/query`, which scopes a bulk to one source
    pub source: Option<String>,
    pub bulk: BulkBuilder,
}

impl CommitBatch {
    pub fn request(&self) -> Result<Value, serde_json::Error> {
        match &self.source {
            Some(source) => serde_json::to_value(self.bulk.to_source_request(source)),
            None => serde_json::to_value(self.bulk.to_request()),
        }
    }
}

/// Known settings and their default values.
pub const SETTINGS: &[(&str, &str)] = &[("migration_mode", DEFAULT_MIGRATION_MODE)];

/// Default value of a known setting.
pub fn default_setting(name: &str) -> Result<&'static str, StateError> {
    SETTINGS
        .iter()
        .find(|(setting, _)| *setting == name)
        .map(|(_, value)| *value)
        .ok_or_else(|| StateError::InvalidSetting(name.to_string()))
}

/// A change to the set of applied versions, staged until the bulk holding
/// the corresponding schema change is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    Insert {
        version: MigrationVersion,
        name: Option<String>,
    },
    Remove(MigrationVersion),
}

impl VersionChange {
    pub fn version(&self) -> MigrationVersion {
        match self {
            VersionChange::Insert { version, .. } => *version,
            VersionChange::Remove(version) => *version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    SqlTable,
    CatalogState,
}

/// Storage of applied migration versions and migration settings.
#[async_trait]
pub trait MigrationStateBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create the tracking storage if missing. Safe to call on every start.
    async fn prepare(&mut self) -> Result<(), StateError>;

    /// Applied versions as currently recorded on the server.
    async fn applied_versions(&mut self) -> Result<Vec<MigrationRecord>, StateError>;

    /// How SQL has to be wrapped for the query endpoint this backend uses.
    fn run_sql_style(&self) -> RunSqlStyle;

    /// Turn a staged bulk into the requests committing it, in send order.
    fn split_commit(&self, bulk: BulkBuilder) -> Vec<CommitBatch>;

    /// Append the operations recording `changes` to `bulk`.
    async fn stage_bookkeeping(
        &mut self,
        changes: &[VersionChange],
        bulk: &mut BulkBuilder,
    ) -> Result<(), StateError>;

    /// Called once every request of a commit was accepted.
    fn committed(&mut self);

    /// Called when a commit failed. Staged bookkeeping is dropped.
    fn aborted(&mut self);

    async fn get_setting(&mut self, name: &str) -> Result<String, StateError>;

    async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), StateError>;
}

/// Backend matching what the server supports.
pub fn open_backend(
    capability: ServerCapability,
    transport: Arc<dyn Transport>,
    config: &ProjectConfig,
) -> Box<dyn MigrationStateBackend> {
    match capability {
        ServerCapability::Legacy => Box::new(SqlTableBackend::new(
            transport,
            config.api_paths.query.clone(),
        )),
        ServerCapability::Datasources => Box::new(CatalogStateBackend::new(
            transport,
            config.api_paths.metadata.clone(),
            config.api_paths.v2_query.clone(),
            config.source.clone(),
        )),
    }
}
