//! Metadata round-trip: export to `metadata.json`, apply it back, reload and
//! list inconsistencies.

use crate::client::{metadata_request_no_prefix, post, ApiError, Operation, Transport, TransportError};
use crate::utils::METADATA_FILE;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Metadata file not found: {0}")]
    NotFound(PathBuf),
}

/// Result of `get_inconsistent_metadata`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InconsistentMetadata {
    pub is_consistent: bool,
    #[serde(default)]
    pub inconsistent_objects: Vec<Value>,
}

pub struct MetadataClient {
    transport: Arc<dyn Transport>,
    path: String,
}

impl MetadataClient {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    async fn call(&self, operation: &Operation) -> Result<Value, MetadataError> {
        let response = post(self.transport.as_ref(), &self.path, operation).await?;
        Ok(response.json()?)
    }

    pub async fn export_metadata(&self) -> Result<Value, MetadataError> {
        self.call(&metadata_request_no_prefix("export_metadata", json!({})))
            .await
    }

    /// Replace the server metadata with `metadata`.
    pub async fn apply_metadata(&self, metadata: Value) -> Result<(), MetadataError> {
        self.call(&metadata_request_no_prefix("replace_metadata", metadata))
            .await?;
        info!("Metadata applied");
        Ok(())
    }

    pub async fn reload_metadata(&self) -> Result<(), MetadataError> {
        self.call(&metadata_request_no_prefix("reload_metadata", json!({})))
            .await?;
        info!("Metadata reloaded");
        Ok(())
    }

    pub async fn inconsistent_metadata(&self) -> Result<InconsistentMetadata, MetadataError> {
        let value = self
            .call(&metadata_request_no_prefix("get_inconsistent_metadata", json!({})))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Export into `<dir>/metadata.json`.
    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf, MetadataError> {
        let metadata = self.export_metadata().await?;
        fs::create_dir_all(dir).await?;

        let path = dir.join(METADATA_FILE);
        fs::write(&path, serde_json::to_string_pretty(&metadata)?).await?;
        info!(path = %path.display(), "Metadata exported");
        Ok(path)
    }

    /// Apply `<dir>/metadata.json`.
    pub async fn apply_from_dir(&self, dir: &Path) -> Result<(), MetadataError> {
        let path = dir.join(METADATA_FILE);
        if !fs::try_exists(&path).await? {
            return Err(MetadataError::NotFound(path));
        }

        let metadata: Value = serde_json::from_str(&fs::read_to_string(&path).await?)?;
        self.apply_metadata(metadata).await
    }
}
