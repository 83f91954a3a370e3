//! Shared test helpers: temp project directories and an in-memory server.

#![allow(dead_code)]

use async_trait::async_trait;
use hasura_migrate::client::{RawResponse, Transport, TransportError};
use hasura_migrate::ProjectConfig;
use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Write a file relative to `dir`, creating parent directories.
pub async fn write_file(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .expect("Failed to create directory");
    }
    tokio::fs::write(path, content)
        .await
        .expect("Failed to write file");
}

pub fn test_config() -> ProjectConfig {
    ProjectConfig::default()
}

static COUNT_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"information_schema\.tables WHERE table_name = '(\w+)'").unwrap());
static CREATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CREATE TABLE IF NOT EXISTS hdb_catalog\.(\w+)").unwrap());
static INSERT_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^INSERT INTO hdb_catalog\.schema_migrations \(version, dirty\) VALUES \((\d+), false\)$")
        .unwrap()
});
static DELETE_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^DELETE FROM hdb_catalog\.schema_migrations WHERE version = (\d+)$").unwrap()
});
static SELECT_SETTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^SELECT value FROM hdb_catalog\.migration_settings WHERE setting = '(\w+)'$")
        .unwrap()
});
static UPSERT_SETTING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^INSERT INTO hdb_catalog\.migration_settings \(setting, value\) VALUES \('(\w+)', '([^']*)'\)")
        .unwrap()
});

const SELECT_VERSIONS: &str = "SELECT version, dirty FROM hdb_catalog.schema_migrations";

/// A request as the server received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn kind(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b["type"].as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct ServerState {
    tables: BTreeSet<String>,
    versions: BTreeSet<u64>,
    settings: BTreeMap<String, String>,
    cli_state: Option<Value>,
    executed_sql: Vec<String>,
}

type OpError = (String, String);

impl ServerState {
    fn apply(&mut self, operation: &Value) -> Result<Value, OpError> {
        let kind = operation["type"].as_str().unwrap_or_default();
        let args = &operation["args"];

        match kind {
            kind if kind.ends_with("run_sql") => {
                let sql = args["sql"].as_str().unwrap_or_default();
                self.run_sql(sql)
            }
            "get_catalog_state" => Ok(json!({
                "id": "fake-catalog",
                "cli_state": self.cli_state.clone().unwrap_or_else(|| json!({})),
                "console_state": {}
            })),
            "set_catalog_state" => {
                if args["type"] != json!("cli") {
                    return Err(("only cli state is supported".into(), "not-supported".into()));
                }
                self.cli_state = Some(args["state"].clone());
                Ok(json!({"message": "success"}))
            }
            _ => Ok(json!({"message": "success"})),
        }
    }

    fn run_sql(&mut self, sql: &str) -> Result<Value, OpError> {
        if let Some(captures) = COUNT_TABLE.captures(sql) {
            let exists = self.tables.contains(&captures[1]);
            return Ok(tuples(&["count"], vec![vec![if exists { "1" } else { "0" }.to_string()]]));
        }
        if let Some(captures) = CREATE_TABLE.captures(sql) {
            self.tables.insert(captures[1].to_string());
            return Ok(command_ok());
        }
        if sql == SELECT_VERSIONS {
            let rows = self
                .versions
                .iter()
                .map(|v| vec![v.to_string(), "f".to_string()])
                .collect();
            return Ok(tuples(&["version", "dirty"], rows));
        }
        if let Some(captures) = INSERT_VERSION.captures(sql) {
            let version: u64 = captures[1].parse().unwrap();
            if !self.versions.insert(version) {
                return Err((
                    "duplicate key value violates unique constraint".into(),
                    "postgres-error".into(),
                ));
            }
            return Ok(command_ok());
        }
        if let Some(captures) = DELETE_VERSION.captures(sql) {
            let version: u64 = captures[1].parse().unwrap();
            self.versions.remove(&version);
            return Ok(command_ok());
        }
        if let Some(captures) = SELECT_SETTING.captures(sql) {
            let rows = self
                .settings
                .get(&captures[1])
                .map(|value| vec![vec![value.clone()]])
                .unwrap_or_default();
            return Ok(tuples(&["value"], rows));
        }
        if let Some(captures) = UPSERT_SETTING.captures(sql) {
            self.settings
                .insert(captures[1].to_string(), captures[2].to_string());
            return Ok(command_ok());
        }
        if sql.contains("syntax error") {
            return Err(("syntax error at or near \"syntax\"".into(), "postgres-error".into()));
        }

        self.executed_sql.push(sql.to_string());
        Ok(command_ok())
    }
}

/// Reject operations the endpoint at `path` does not accept. `bulk_source`
/// is the top-level source of the enclosing bulk, if any.
fn check_endpoint(path: &str, operation: &Value, bulk_source: Option<&Value>) -> Result<(), OpError> {
    let kind = operation["type"].as_str().unwrap_or_default();
    let is_sql = kind.ends_with("run_sql");
    let is_catalog = kind == "get_catalog_state" || kind == "set_catalog_state";
    match path {
        "v1/query" if !is_catalog => Ok(()),
        "v1/metadata" if !is_sql => Ok(()),
        "v2/query" if is_sql => {
            let source = operation.get("source").or(bulk_source);
            if source.and_then(Value::as_str).is_some() {
                Ok(())
            } else {
                Err(("the key 'source' was not present".into(), "parse-failed".into()))
            }
        }
        _ => Err((
            format!("unexpected type \"{}\" on {}", kind, path),
            "parse-failed".into(),
        )),
    }
}

fn tuples(header: &[&str], rows: Vec<Vec<String>>) -> Value {
    let mut result = vec![json!(header)];
    result.extend(rows.into_iter().map(|row| json!(row)));
    json!({"result_type": "TuplesOk", "result": result})
}

fn command_ok() -> Value {
    json!({"result_type": "CommandOk", "result": null})
}

fn error_body(path: String, error: String, code: String) -> Value {
    json!({"path": path, "error": error, "code": code})
}

/// In-memory stand-in for the engine: tracking tables, catalog state and
/// atomic bulk requests.
pub struct FakeServer {
    version: String,
    state: Mutex<ServerState>,
    requests: Mutex<Vec<RecordedRequest>>,
    /// Operation index to fail, optionally only on one path
    fail_at: Mutex<Option<(Option<String>, usize)>>,
}

impl FakeServer {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            state: Mutex::new(ServerState::default()),
            requests: Mutex::new(Vec::new()),
            fail_at: Mutex::new(None),
        }
    }

    /// A server tracking migrations in `hdb_catalog` tables.
    pub fn legacy() -> Arc<Self> {
        Arc::new(Self::new("v1.3.3"))
    }

    /// A server tracking migrations in the cli catalog state.
    pub fn modern() -> Arc<Self> {
        Arc::new(Self::new("v2.0.0"))
    }

    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::clone(self) as Arc<dyn Transport>
    }

    /// Make the operation at `index` of the next bulks fail.
    pub fn fail_bulk_at(&self, index: usize) {
        *self.fail_at.lock().unwrap() = Some((None, index));
    }

    /// Like [`Self::fail_bulk_at`], for bulks sent to `path` only.
    pub fn fail_path_bulk_at(&self, path: &str, index: usize) {
        *self.fail_at.lock().unwrap() = Some((Some(path.to_string()), index));
    }

    pub fn clear_failure(&self) {
        *self.fail_at.lock().unwrap() = None;
    }

    pub fn set_cli_state(&self, state: Value) {
        self.state.lock().unwrap().cli_state = Some(state);
    }

    pub fn cli_state(&self) -> Option<Value> {
        self.state.lock().unwrap().cli_state.clone()
    }

    /// Simulate another client writing the catalog state.
    pub fn bump_revision(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(cli_state) = state.cli_state.as_mut() {
            let revision = cli_state["revision"].as_u64().unwrap_or(0);
            cli_state["revision"] = json!(revision + 1);
        }
    }

    /// Versions recorded by either tracking mechanism.
    pub fn applied_versions(&self) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        let mut versions: BTreeSet<u64> = state.versions.clone();
        if let Some(records) = state
            .cli_state
            .as_ref()
            .and_then(|s| s["schema_migrations"].as_array())
        {
            versions.extend(records.iter().filter_map(|r| r["version"].as_u64()));
        }
        versions.into_iter().collect()
    }

    pub fn insert_legacy_version(&self, version: u64) {
        self.state.lock().unwrap().versions.insert(version);
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state.lock().unwrap().executed_sql.clone()
    }

    pub fn setting(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().settings.get(name).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Bodies of every `bulk` request received.
    pub fn bulk_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind() == Some("bulk"))
            .collect()
    }

    fn handle(&self, method: &Method, path: &str, body: Option<&Value>) -> (StatusCode, Value) {
        if method == Method::GET {
            return if path == "v1/version" {
                (StatusCode::OK, json!({"version": self.version}))
            } else {
                (StatusCode::NOT_FOUND, error_body("$".into(), "not found".into(), "not-found".into()))
            };
        }

        let Some(body) = body else {
            return (
                StatusCode::BAD_REQUEST,
                error_body("$".into(), "missing body".into(), "parse-failed".into()),
            );
        };

        let mut state = self.state.lock().unwrap();
        if body["type"] != json!("bulk") {
            return match check_endpoint(path, body, None).and_then(|_| state.apply(body)) {
                Ok(result) => (StatusCode::OK, result),
                Err((error, code)) => (
                    StatusCode::BAD_REQUEST,
                    error_body("$.args".into(), error, code),
                ),
            };
        }

        // Bulk requests are atomic
        let fail_at = match self.fail_at.lock().unwrap().clone() {
            Some((Some(only), index)) if only == path => Some(index),
            Some((None, index)) => Some(index),
            _ => None,
        };
        let bulk_source = body.get("source");
        let mut staged = state.clone();
        let mut results = Vec::new();
        let operations = body["args"].as_array().cloned().unwrap_or_default();
        for (index, operation) in operations.iter().enumerate() {
            let outcome = if fail_at == Some(index) {
                Err(("injected failure".to_string(), "postgres-error".to_string()))
            } else {
                check_endpoint(path, operation, bulk_source).and_then(|_| staged.apply(operation))
            };
            match outcome {
                Ok(result) => results.push(result),
                Err((error, code)) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        error_body(format!("$.args[{}].args", index), error, code),
                    )
                }
            }
        }
        *state = staged;
        (StatusCode::OK, Value::Array(results))
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body: body.cloned(),
        });

        let (status, response) = self.handle(&method, path, body);
        Ok(RawResponse::new(status, serde_json::to_vec(&response)?))
    }
}
