use super::types::{CatalogError, CatalogState, CliState, VersionedCliState};
use crate::client::{metadata_request_no_prefix, post, Operation, Transport};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Reads and replaces the `cli` catalog state through the metadata endpoint.
#[derive(Clone)]
pub struct CatalogStore {
    transport: Arc<dyn Transport>,
    path: String,
}

impl CatalogStore {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    /// Fetch the whole catalog state.
    pub async fn get(&self) -> Result<CatalogState, CatalogError> {
        let request = metadata_request_no_prefix("get_catalog_state", json!({}));
        let response = post(self.transport.as_ref(), &self.path, &request).await?;
        Ok(response.json()?)
    }

    /// Fetch and decode the cli state.
    pub async fn get_cli_state(&self) -> Result<VersionedCliState, CatalogError> {
        self.get().await?.cli()
    }

    /// Replace the cli state. No revision check.
    pub async fn set(&self, state: &CliState) -> Result<(), CatalogError> {
        let request = Self::set_operation(state)?;
        debug!(revision = state.revision, "Setting cli state");
        post(self.transport.as_ref(), &self.path, &request)
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fail if the remote revision moved away from `expected` since it was read.
    pub async fn check_revision(&self, expected: u64) -> Result<(), CatalogError> {
        let found = match self.get_cli_state().await? {
            VersionedCliState::V2(state) => state.revision,
            VersionedCliState::V1(_) => 0,
        };
        if found != expected {
            return Err(CatalogError::ConcurrentModification { expected, found });
        }
        Ok(())
    }

    /// Replace the cli state if nobody else wrote it since `state` was read.
    /// Returns the written state, which carries the next revision.
    pub async fn set_checked(&self, state: &CliState) -> Result<CliState, CatalogError> {
        self.check_revision(state.revision).await?;
        let next = CliState {
            revision: state.revision + 1,
            ..state.clone()
        };
        self.set(&next).await?;
        Ok(next)
    }

    /// `set_catalog_state` operation, for sending the write inside a bulk.
    pub fn set_operation(state: &CliState) -> Result<Operation, CatalogError> {
        Ok(metadata_request_no_prefix(
            "set_catalog_state",
            json!({ "type": "cli", "state": state.to_value()? }),
        ))
    }
}
