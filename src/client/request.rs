//! Request bodies for the three endpoint families.
//!
//! - legacy query (`v1/query`): `{type, args}`
//! - metadata (`v1/metadata`): `{type: <prefix><action>, args, source?}`
//! - source-scoped query (`v2/query`): `{type, source, args}`, `source` always present

use crate::config::DatabaseDriver;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One server-side action. Used both as a standalone request body and as
/// an element of a `bulk` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Any other top-level keys (e.g. `version` on `replace_metadata`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Operation {
    pub fn new(kind: impl Into<String>, args: Value) -> Self {
        Self {
            kind: kind.into(),
            args,
            source: None,
            extra: Map::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Legacy `v1/query` body. Never carries a source.
pub fn query_request(kind: &str, args: Value) -> Operation {
    Operation::new(kind, args)
}

/// `v1/metadata` body for a source-scoped action, e.g. `pg_track_table`.
/// The source is omitted when empty.
pub fn metadata_request(
    action: &str,
    args: Value,
    driver: DatabaseDriver,
    source: &str,
) -> Operation {
    let operation = Operation::new(format!("{}{}", driver.prefix(), action), args);
    if source.is_empty() {
        operation
    } else {
        operation.with_source(source)
    }
}

/// `v1/metadata` body for actions that are not tied to a database backend,
/// e.g. `get_catalog_state` or `export_metadata`.
pub fn metadata_request_no_prefix(action: &str, args: Value) -> Operation {
    Operation::new(action, args)
}

/// `v2/query` body. The source is mandatory; an empty string selects the default source.
pub fn v2_query_request(kind: &str, args: Value, source: &str) -> Operation {
    Operation::new(kind, args).with_source(source)
}

/// Arguments of a `run_sql` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSqlArgs {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_metadata_consistency: Option<bool>,
}

impl RunSqlArgs {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }
}

/// How `run_sql` is spelled on the query endpoint a backend sends SQL to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSqlStyle {
    /// Plain `run_sql` on the legacy query endpoint
    Query,
    /// `run_sql` with a top-level source, on the `v2/query` endpoint
    V2Query { source: String },
}

impl RunSqlStyle {
    pub fn operation(&self, args: RunSqlArgs) -> Operation {
        match self {
            RunSqlStyle::Query => query_request("run_sql", to_value(&args)),
            RunSqlStyle::V2Query { source } => {
                v2_query_request("run_sql", to_value(&args), source_or_default(source))
            }
        }
    }

    /// Source a `v2/query` bulk carrying these operations is scoped to.
    pub fn bulk_source(&self) -> Option<&str> {
        match self {
            RunSqlStyle::Query => None,
            RunSqlStyle::V2Query { source } => Some(source_or_default(source)),
        }
    }
}

/// Whether `operation` is SQL, which only the query endpoints accept.
pub fn is_sql(operation: &Operation) -> bool {
    operation.kind.ends_with("run_sql")
}

fn source_or_default(source: &str) -> &str {
    if source.is_empty() {
        "default"
    } else {
        source
    }
}

fn to_value(args: &RunSqlArgs) -> Value {
    // RunSqlArgs only holds strings and booleans
    serde_json::to_value(args).unwrap_or(Value::Null)
}

/// `{type: "bulk", args: [...]}`, optionally scoped to a source for `v2/query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'a str>,
    pub args: &'a [Operation],
}

/// Successful response of a `run_sql` action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqlResponse {
    pub result_type: String,
    #[serde(default)]
    pub result: Option<Vec<Vec<Option<String>>>>,
}

pub const TUPLES_OK: &str = "TuplesOk";
pub const COMMAND_OK: &str = "CommandOk";

impl SqlResponse {
    /// Data rows, without the header row.
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        match &self.result {
            Some(rows) if !rows.is_empty() => &rows[1..],
            _ => &[],
        }
    }

    pub fn is_tuples(&self) -> bool {
        self.result_type == TUPLES_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_has_no_source() {
        let request = query_request("run_sql", json!({"sql": "SELECT 1"}));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "run_sql", "args": {"sql": "SELECT 1"}})
        );
    }

    #[test]
    fn test_metadata_request_prefix_and_source() {
        let request = metadata_request("track_table", json!({}), DatabaseDriver::Postgres, "");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "pg_track_table", "args": {}})
        );

        let request = metadata_request("track_table", json!({}), DatabaseDriver::Mysql, "db2");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "mysql_track_table", "args": {}, "source": "db2"})
        );
    }

    #[test]
    fn test_v2_query_always_has_source() {
        let request = v2_query_request("run_sql", json!({"sql": "SELECT 1"}), "");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["source"], json!(""));
        assert_eq!(value["type"], json!("run_sql"));
    }

    #[test]
    fn test_run_sql_styles() {
        let mut args = RunSqlArgs::new("CREATE TABLE t(id int)");
        args.check_metadata_consistency = Some(false);

        let legacy = RunSqlStyle::Query.operation(args.clone());
        assert_eq!(
            serde_json::to_value(&legacy).unwrap(),
            json!({
                "type": "run_sql",
                "args": {"sql": "CREATE TABLE t(id int)", "check_metadata_consistency": false}
            })
        );

        let modern = RunSqlStyle::V2Query {
            source: String::new(),
        };
        assert_eq!(modern.bulk_source(), Some("default"));
        assert_eq!(
            serde_json::to_value(modern.operation(RunSqlArgs::new("SELECT 1"))).unwrap(),
            json!({"type": "run_sql", "args": {"sql": "SELECT 1"}, "source": "default"})
        );
        assert_eq!(RunSqlStyle::Query.bulk_source(), None);
    }

    #[test]
    fn test_is_sql() {
        assert!(is_sql(&query_request("run_sql", json!({}))));
        assert!(is_sql(&Operation::new("citus_run_sql", json!({}))));
        assert!(!is_sql(&Operation::new("track_table", json!({}))));
        assert!(!is_sql(&Operation::new("set_catalog_state", json!({}))));
    }

    #[test]
    fn test_operation_keeps_unknown_keys() {
        let value = json!({"type": "replace_metadata", "version": 2, "args": {}});
        let operation: Operation = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(operation.kind, "replace_metadata");
        assert_eq!(serde_json::to_value(&operation).unwrap(), value);
    }

    #[test]
    fn test_sql_response_rows_skip_header() {
        let response: SqlResponse = serde_json::from_value(json!({
            "result_type": "TuplesOk",
            "result": [["version", "dirty"], ["1000", "f"], ["2000", "f"]]
        }))
        .unwrap();
        assert!(response.is_tuples());
        assert_eq!(response.rows().len(), 2);
        assert_eq!(response.rows()[0][0].as_deref(), Some("1000"));

        let empty: SqlResponse =
            serde_json::from_value(json!({"result_type": "CommandOk", "result": null})).unwrap();
        assert!(empty.rows().is_empty());
    }
}
