//! Typed catalog state.
//!
//! The engine stores the cli state as an opaque JSON blob. Two layouts exist:
//! the legacy one without a `version` key, and version 2 which carries a
//! revision counter. Legacy state is upgraded when read.

use crate::migration::MigrationVersion;
use crate::utils::{MIGRATIONS_TABLE, SETTINGS_TABLE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current layout of the cli state.
pub const CLI_STATE_VERSION: u64 = 2;

/// Default value of the `migration_mode` setting.
pub const DEFAULT_MIGRATION_MODE: &str = "true";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Transport error: {0}")]
    Transport(#[from] crate::client::TransportError),

    #[error("API error: {0}")]
    Api(#[from] crate::client::ApiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported cli state version {0}")]
    UnsupportedVersion(u64),

    #[error("Invalid cli state: {0}")]
    InvalidState(String),

    #[error("Catalog state was modified concurrently (expected revision {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },
}

/// Response of `get_catalog_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cli_state: Option<Value>,
    #[serde(default)]
    pub console_state: Option<Value>,
}

impl CatalogState {
    /// Decode the cli state, whatever its layout.
    pub fn cli(&self) -> Result<VersionedCliState, CatalogError> {
        VersionedCliState::decode(self.cli_state.as_ref())
    }
}

/// One applied migration as recorded in the cli state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: MigrationVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub dirty: bool,
}

impl MigrationRecord {
    pub fn new(version: MigrationVersion, name: Option<String>) -> Self {
        Self {
            version,
            name,
            dirty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSettings {
    #[serde(
        default = "default_migration_mode",
        deserialize_with = "bool_or_string"
    )]
    pub migration_mode: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            migration_mode: default_migration_mode(),
        }
    }
}

fn default_migration_mode() -> String {
    DEFAULT_MIGRATION_MODE.to_string()
}

/// Older clients wrote `migration_mode` as a boolean.
fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(value) => value.to_string(),
        Raw::Text(value) => value,
    })
}

/// Version 2 of the cli state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliState {
    pub version: u64,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub schema_migrations: Vec<MigrationRecord>,
    #[serde(default)]
    pub migration_settings: MigrationSettings,
    /// Keys written by other tools, kept on write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CliState {
    fn default() -> Self {
        Self {
            version: CLI_STATE_VERSION,
            revision: 0,
            schema_migrations: Vec::new(),
            migration_settings: MigrationSettings::default(),
            extra: Map::new(),
        }
    }
}

impl CliState {
    pub fn contains(&self, version: MigrationVersion) -> bool {
        self.schema_migrations.iter().any(|m| m.version == version)
    }

    /// Record `record`, replacing an existing entry for the same version.
    pub fn insert(&mut self, record: MigrationRecord) {
        self.remove(record.version);
        self.schema_migrations.push(record);
        self.schema_migrations.sort_by_key(|m| m.version);
    }

    pub fn remove(&mut self, version: MigrationVersion) -> bool {
        let before = self.schema_migrations.len();
        self.schema_migrations.retain(|m| m.version != version);
        before != self.schema_migrations.len()
    }

    pub fn to_value(&self) -> Result<Value, CatalogError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Legacy cli state: no `version` key.
///
/// `schema_migrations` may be missing, a placeholder (`{}` or `true`) or a
/// list written by older clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliStateV1 {
    pub schema_migrations: Vec<MigrationRecord>,
    pub migration_settings: Option<MigrationSettings>,
    pub extra: Map<String, Value>,
}

/// Cli state as found on the server.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionedCliState {
    V1(CliStateV1),
    V2(CliState),
}

impl VersionedCliState {
    /// Decode by the `version` discriminator. A missing or null state is an
    /// empty legacy state.
    pub fn decode(value: Option<&Value>) -> Result<Self, CatalogError> {
        let object = match value {
            None | Some(Value::Null) => return Ok(VersionedCliState::V1(CliStateV1::default())),
            Some(Value::Object(object)) => object,
            Some(other) => {
                return Err(CatalogError::InvalidState(format!(
                    "expected an object, found {}",
                    other
                )))
            }
        };

        match object.get("version") {
            None | Some(Value::Null) => decode_v1(object).map(VersionedCliState::V1),
            Some(version) => match version.as_u64() {
                Some(CLI_STATE_VERSION) => Ok(VersionedCliState::V2(serde_json::from_value(
                    Value::Object(object.clone()),
                )?)),
                Some(other) => Err(CatalogError::UnsupportedVersion(other)),
                None => Err(CatalogError::InvalidState(format!(
                    "version must be a number, found {}",
                    version
                ))),
            },
        }
    }

    pub fn needs_upgrade(&self) -> bool {
        matches!(self, VersionedCliState::V1(_))
    }

    /// The state in the current layout. Upgraded state starts at revision 0.
    pub fn upgrade(self) -> CliState {
        match self {
            VersionedCliState::V2(state) => state,
            VersionedCliState::V1(legacy) => {
                let mut state = CliState {
                    migration_settings: legacy.migration_settings.unwrap_or_default(),
                    extra: legacy.extra,
                    ..Default::default()
                };
                for record in legacy.schema_migrations {
                    state.insert(record);
                }
                state
            }
        }
    }
}

fn decode_v1(object: &Map<String, Value>) -> Result<CliStateV1, CatalogError> {
    let mut extra = object.clone();

    let schema_migrations = match extra.remove(MIGRATIONS_TABLE) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<MigrationRecord>, _>>()?,
        // placeholder written when the key was first created
        _ => Vec::new(),
    };

    let migration_settings = match extra.remove(SETTINGS_TABLE) {
        Some(Value::Object(settings)) if !settings.is_empty() => {
            Some(serde_json::from_value(Value::Object(settings))?)
        }
        _ => None,
    };

    Ok(CliStateV1 {
        schema_migrations,
        migration_settings,
        extra,
    })
}
