//! Server version and capability detection.
//!
//! The server reports its version on `GET v1/version`. Servers from 2.0.0
//! (pre-releases included) support multiple data sources and keep migration
//! state in the catalog; older ones use tracking tables.

mod types;

pub use types::{SemVer, ServerCapability, VersionError};

use crate::client::Transport;
use http::Method;
use serde::Deserialize;
use tracing::{debug, info};

/// Body of `GET v1/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    #[serde(default)]
    pub server_type: Option<String>,
}

impl ServerInfo {
    pub fn semver(&self) -> Option<SemVer> {
        SemVer::parse(&self.version).ok()
    }

    pub fn capability(&self) -> ServerCapability {
        ServerCapability::from_version(&self.version)
    }
}

/// Ask the server for its version.
pub async fn probe_server(transport: &dyn Transport, path: &str) -> Result<ServerInfo, VersionError> {
    let response = transport.send(Method::GET, path, None).await?;
    let info: ServerInfo = response.json()?;
    debug!(version = %info.version, "Probed server version");
    Ok(info)
}

/// Capability to use: the override if given, otherwise what the server reports.
pub async fn detect_capability(
    transport: &dyn Transport,
    path: &str,
    overridden: Option<ServerCapability>,
) -> Result<ServerCapability, VersionError> {
    if let Some(capability) = overridden {
        debug!(%capability, "Using configured server capability");
        return Ok(capability);
    }

    let info = probe_server(transport, path).await?;
    let capability = info.capability();
    info!(server_version = %info.version, %capability, "Detected server capability");
    Ok(capability)
}
