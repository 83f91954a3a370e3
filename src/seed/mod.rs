//! Seed SQL files: data fixtures applied on demand, never tracked.

use crate::bulk::{attribute_error, BulkBuilder};
use crate::client::{post, ApiError, RunSqlArgs, RunSqlStyle, Transport, TransportError};
use crate::config::ProjectConfig;
use crate::migration::validate_name;
use crate::utils::now_millis;
use crate::version::ServerCapability;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Seed file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid seed name: {0}")]
    InvalidName(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Seed {file} failed: [{code}] {message}")]
    Failed {
        file: String,
        path: String,
        code: String,
        message: String,
        query: Option<String>,
    },
}

/// Endpoint and `run_sql` shape seeds are sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTarget {
    pub path: String,
    pub style: RunSqlStyle,
}

impl SeedTarget {
    /// Legacy servers take seeds on the query endpoint, newer ones on
    /// `v2/query` scoped to the configured source.
    pub fn new(capability: ServerCapability, config: &ProjectConfig) -> Self {
        match capability {
            ServerCapability::Legacy => Self {
                path: config.api_paths.query.clone(),
                style: RunSqlStyle::Query,
            },
            ServerCapability::Datasources => Self {
                path: config.api_paths.v2_query.clone(),
                style: RunSqlStyle::V2Query {
                    source: config.source.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplySeedsResult {
    /// Seed files sent, in order
    pub files: Vec<String>,
}

/// Apply every `.sql` file of `seeds_dir` (sorted by name), or only `file`,
/// as one bulk request.
pub async fn apply_seeds(
    transport: &dyn Transport,
    target: &SeedTarget,
    seeds_dir: &Path,
    file: Option<&str>,
) -> Result<ApplySeedsResult, SeedError> {
    let files = match file {
        Some(name) => {
            if !is_plain_file_name(name) {
                return Err(SeedError::InvalidName(name.to_string()));
            }
            let path = seeds_dir.join(name);
            if !fs::try_exists(&path).await? {
                return Err(SeedError::NotFound(path));
            }
            vec![name.to_string()]
        }
        None => list_seed_files(seeds_dir).await?,
    };

    let mut bulk = BulkBuilder::new();
    for name in &files {
        let sql = fs::read_to_string(seeds_dir.join(name)).await?;
        if sql.trim().is_empty() {
            debug!(file = %name, "Skipping empty seed");
            continue;
        }
        bulk.append(target.style.operation(RunSqlArgs::new(sql)), name.as_str());
    }

    if bulk.is_empty() {
        info!(dir = %seeds_dir.display(), "No seeds to apply");
        return Ok(ApplySeedsResult::default());
    }

    let request = match target.style.bulk_source() {
        Some(source) => serde_json::to_value(bulk.to_source_request(source))?,
        None => serde_json::to_value(bulk.to_request())?,
    };

    info!(count = bulk.len(), "Applying seeds");
    let response = post(transport, &target.path, &request).await?;
    if let Err(e) = response.error_for_status() {
        let seed_error = match attribute_error(&e, &request, &bulk) {
            Some(attributed) => SeedError::Failed {
                file: attributed.file.unwrap_or_default(),
                path: attributed.error.path,
                code: attributed.error.code,
                message: attributed.error.error,
                query: attributed.query,
            },
            None => SeedError::Api(e),
        };
        error!(error = %seed_error, "Applying seeds failed");
        return Err(seed_error);
    }

    Ok(ApplySeedsResult { files })
}

async fn list_seed_files(seeds_dir: &Path) -> Result<Vec<String>, SeedError> {
    if !fs::try_exists(seeds_dir).await? {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(seeds_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

/// A single path component, so it cannot leave the seeds directory.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Write `<millis>_<name>.sql` into the seeds directory.
pub async fn create_seed(seeds_dir: &Path, name: &str, content: &str) -> Result<PathBuf, SeedError> {
    validate_name(name).map_err(|_| SeedError::InvalidName(name.to_string()))?;

    fs::create_dir_all(seeds_dir).await?;
    let path = seeds_dir.join(format!("{}_{}.sql", now_millis(), name));
    fs::write(&path, content).await?;

    info!(path = %path.display(), "Created seed");
    Ok(path)
}
