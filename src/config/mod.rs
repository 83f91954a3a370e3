use crate::utils::{
    get_config_path, DEFAULT_METADATA_DIR, DEFAULT_MIGRATIONS_DIR, DEFAULT_SEEDS_DIR,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, url::ParseError),

    #[error("Unsupported config version {0}, expected 1, 2 or 3")]
    UnsupportedVersion(u32),
}

fn default_config_version() -> u32 {
    3
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_migrations_directory() -> String {
    DEFAULT_MIGRATIONS_DIR.to_string()
}

fn default_seeds_directory() -> String {
    DEFAULT_SEEDS_DIR.to_string()
}

fn default_metadata_directory() -> String {
    DEFAULT_METADATA_DIR.to_string()
}

/// Custom API paths, relative to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPaths {
    #[serde(default = "ApiPaths::default_query")]
    pub query: String,
    #[serde(default = "ApiPaths::default_metadata")]
    pub metadata: String,
    #[serde(default = "ApiPaths::default_v2_query")]
    pub v2_query: String,
    #[serde(default = "ApiPaths::default_version")]
    pub version: String,
}

impl ApiPaths {
    fn default_query() -> String {
        "v1/query".to_string()
    }

    fn default_metadata() -> String {
        "v1/metadata".to_string()
    }

    fn default_v2_query() -> String {
        "v2/query".to_string()
    }

    fn default_version() -> String {
        "v1/version".to_string()
    }
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            query: Self::default_query(),
            metadata: Self::default_metadata(),
            v2_query: Self::default_v2_query(),
            version: Self::default_version(),
        }
    }
}

/// Database backend behind a data source. Decides the `v1/metadata` action prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Postgres,
    Mysql,
}

impl DatabaseDriver {
    /// Prefix for source-scoped `v1/metadata` actions
    pub fn prefix(&self) -> &'static str {
        match self {
            DatabaseDriver::Postgres => "pg_",
            DatabaseDriver::Mysql => "mysql_",
        }
    }
}

/// Project configuration, stored in `config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_secret: Option<String>,
    /// Deprecated, superseded by `admin_secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default)]
    pub api_paths: ApiPaths,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_migrations_directory")]
    pub migrations_directory: String,
    #[serde(default = "default_seeds_directory")]
    pub seeds_directory: String,
    #[serde(default = "default_metadata_directory")]
    pub metadata_directory: String,
    #[serde(default)]
    pub database_driver: DatabaseDriver,
    /// Data source migrations run against. Empty means the server default.
    #[serde(default)]
    pub source: String,
    /// Send `check_metadata_consistency: false` with every migration `run_sql`
    #[serde(default)]
    pub disable_metadata_consistency_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            endpoint: default_endpoint(),
            admin_secret: None,
            access_key: None,
            api_paths: ApiPaths::default(),
            headers: HashMap::new(),
            migrations_directory: default_migrations_directory(),
            seeds_directory: default_seeds_directory(),
            metadata_directory: default_metadata_directory(),
            database_driver: DatabaseDriver::default(),
            source: String::new(),
            disable_metadata_consistency_check: false,
            timeout_secs: None,
        }
    }
}

impl ProjectConfig {
    /// Check the config version and that the endpoint parses as a URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.version) {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(self.endpoint.clone(), e))?;
        Ok(())
    }

    pub fn migrations_path(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.migrations_directory)
    }

    pub fn seeds_path(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.seeds_directory)
    }

    pub fn metadata_path(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.metadata_directory)
    }
}

/// Read the configuration file
pub async fn read_config(project_path: &Path) -> Result<Option<ProjectConfig>, ConfigError> {
    let config_path = get_config_path(project_path);

    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&config_path).await?;
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub async fn write_config(project_path: &Path, config: &ProjectConfig) -> Result<(), ConfigError> {
    let config_path = get_config_path(project_path);
    let content = serde_yaml::to_string(config)?;
    fs::write(&config_path, content).await?;
    Ok(())
}
