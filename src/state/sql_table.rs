use super::{
    default_setting, BackendKind, CommitBatch, MigrationStateBackend, StateError, VersionChange,
    SETTINGS,
};
use crate::bulk::BulkBuilder;
use crate::catalog::MigrationRecord;
use crate::client::{post, ApiError, RunSqlArgs, RunSqlStyle, SqlResponse, Transport};
use crate::client::request::COMMAND_OK;
use crate::utils::{sql_literal, CATALOG_SCHEMA, MIGRATIONS_TABLE, SETTINGS_TABLE};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Tracking tables in `hdb_catalog`, reached through the legacy query endpoint.
pub struct SqlTableBackend {
    transport: Arc<dyn Transport>,
    path: String,
}

impl SqlTableBackend {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    async fn run_sql(&self, sql: String) -> Result<SqlResponse, StateError> {
        debug!(sql = %sql, "Running bookkeeping query");
        let request = RunSqlStyle::Query.operation(RunSqlArgs::new(sql));
        let response = post(self.transport.as_ref(), &self.path, &request).await?;
        Ok(response.json()?)
    }

    /// Check-then-create. Returns whether the table was created.
    async fn ensure_table(&self, table: &str, columns: &str) -> Result<bool, StateError> {
        let response = self
            .run_sql(format!(
                "SELECT COUNT(1) FROM information_schema.tables WHERE table_name = {} AND table_schema = {} LIMIT 1",
                sql_literal(table),
                sql_literal(CATALOG_SCHEMA)
            ))
            .await?;
        if !response.is_tuples() {
            return Err(ApiError::ResultType(response.result_type).into());
        }

        let exists = response
            .rows()
            .first()
            .and_then(|row| row.first())
            .and_then(|count| count.as_deref())
            .map(|count| count != "0")
            .unwrap_or(false);
        if exists {
            return Ok(false);
        }

        let response = self
            .run_sql(format!(
                "CREATE TABLE IF NOT EXISTS {}.{} ({})",
                CATALOG_SCHEMA, table, columns
            ))
            .await?;
        if response.result_type != COMMAND_OK {
            return Err(ApiError::ResultType(response.result_type).into());
        }

        info!(table = %format!("{}.{}", CATALOG_SCHEMA, table), "Created tracking table");
        Ok(true)
    }

    fn upsert_setting_sql(name: &str, value: &str) -> String {
        format!(
            "INSERT INTO {}.{} (setting, value) VALUES ({}, {}) ON CONFLICT (setting) DO UPDATE SET value = EXCLUDED.value",
            CATALOG_SCHEMA,
            SETTINGS_TABLE,
            sql_literal(name),
            sql_literal(value)
        )
    }
}

#[async_trait]
impl MigrationStateBackend for SqlTableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SqlTable
    }

    async fn prepare(&mut self) -> Result<(), StateError> {
        self.ensure_table(MIGRATIONS_TABLE, "version bigint not null primary key, dirty boolean not null")
            .await?;

        if self
            .ensure_table(SETTINGS_TABLE, "setting text not null primary key, value text not null")
            .await?
        {
            for (name, value) in SETTINGS {
                self.run_sql(Self::upsert_setting_sql(name, value)).await?;
            }
        }
        Ok(())
    }

    async fn applied_versions(&mut self) -> Result<Vec<MigrationRecord>, StateError> {
        let response = self
            .run_sql(format!(
                "SELECT version, dirty FROM {}.{}",
                CATALOG_SCHEMA, MIGRATIONS_TABLE
            ))
            .await?;
        if !response.is_tuples() {
            return Err(ApiError::ResultType(response.result_type).into());
        }

        response
            .rows()
            .iter()
            .map(|row| {
                let invalid = || StateError::InvalidRow {
                    table: MIGRATIONS_TABLE.to_string(),
                    row: format!("{:?}", row),
                };
                let version = row
                    .first()
                    .and_then(|v| v.as_deref())
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(invalid)?;
                let dirty = matches!(row.get(1).and_then(|d| d.as_deref()), Some("t" | "true"));
                Ok(MigrationRecord {
                    version,
                    name: None,
                    dirty,
                })
            })
            .collect()
    }

    fn run_sql_style(&self) -> RunSqlStyle {
        RunSqlStyle::Query
    }

    fn split_commit(&self, bulk: BulkBuilder) -> Vec<CommitBatch> {
        vec![CommitBatch {
            path: self.path.clone(),
            source: None,
            bulk,
        }]
    }

    async fn stage_bookkeeping(
        &mut self,
        changes: &[VersionChange],
        bulk: &mut BulkBuilder,
    ) -> Result<(), StateError> {
        for change in changes {
            let sql = match change {
                VersionChange::Insert { version, .. } => format!(
                    "INSERT INTO {}.{} (version, dirty) VALUES ({}, false)",
                    CATALOG_SCHEMA, MIGRATIONS_TABLE, version
                ),
                VersionChange::Remove(version) => format!(
                    "DELETE FROM {}.{} WHERE version = {}",
                    CATALOG_SCHEMA, MIGRATIONS_TABLE, version
                ),
            };
            bulk.append_unattributed(RunSqlStyle::Query.operation(RunSqlArgs::new(sql)));
        }
        Ok(())
    }

    fn committed(&mut self) {}

    fn aborted(&mut self) {}

    async fn get_setting(&mut self, name: &str) -> Result<String, StateError> {
        let default = default_setting(name)?;
        let response = self
            .run_sql(format!(
                "SELECT value FROM {}.{} WHERE setting = {}",
                CATALOG_SCHEMA,
                SETTINGS_TABLE,
                sql_literal(name)
            ))
            .await?;

        Ok(response
            .rows()
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.clone())
            .unwrap_or_else(|| default.to_string()))
    }

    async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), StateError> {
        default_setting(name)?;
        self.run_sql(Self::upsert_setting_sql(name, value)).await?;
        info!(setting = %name, value = %value, "Updated migration setting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpTransport;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> SqlTableBackend {
        let transport = HttpTransport::new(&server.uri()).unwrap();
        SqlTableBackend::new(Arc::new(transport), "v1/query")
    }

    #[tokio::test]
    async fn test_applied_versions_parses_rows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .and(body_partial_json(json!({
                "args": {"sql": "SELECT version, dirty FROM hdb_catalog.schema_migrations"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result_type": "TuplesOk",
                "result": [["version", "dirty"], ["1000", "f"], ["2000", "t"]]
            })))
            .mount(&mock_server)
            .await;

        let records = backend(&mock_server).applied_versions().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].version, 1000);
        assert!(!records[0].dirty);
        assert!(records[1].dirty);
    }

    #[tokio::test]
    async fn test_applied_versions_rejects_bad_rows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result_type": "TuplesOk",
                "result": [["version", "dirty"], ["abc", "f"]]
            })))
            .mount(&mock_server)
            .await;

        let result = backend(&mock_server).applied_versions().await;
        assert!(matches!(result, Err(StateError::InvalidRow { .. })));
    }

    #[tokio::test]
    async fn test_prepare_skips_existing_tables() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result_type": "TuplesOk",
                "result": [["count"], ["1"]]
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        backend(&mock_server).prepare().await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_bookkeeping_appends_sql() {
        let mock_server = MockServer::start().await;
        let mut backend = backend(&mock_server);
        let mut bulk = BulkBuilder::new();
        backend
            .stage_bookkeeping(
                &[
                    VersionChange::Insert {
                        version: 2000,
                        name: Some("seed".to_string()),
                    },
                    VersionChange::Remove(1000),
                ],
                &mut bulk,
            )
            .await
            .unwrap();

        let request = serde_json::to_value(bulk.to_request()).unwrap();
        assert_eq!(
            request["args"][0]["args"]["sql"],
            json!("INSERT INTO hdb_catalog.schema_migrations (version, dirty) VALUES (2000, false)")
        );
        assert_eq!(
            request["args"][1]["args"]["sql"],
            json!("DELETE FROM hdb_catalog.schema_migrations WHERE version = 1000")
        );
        assert_eq!(bulk.file_for(0), None);

        let batches = backend.split_commit(bulk);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].path, "v1/query");
        assert_eq!(batches[0].source, None);
        assert_eq!(batches[0].bulk.len(), 2);
    }

    #[tokio::test]
    async fn test_get_setting_falls_back_to_default() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result_type": "TuplesOk",
                "result": [["value"]]
            })))
            .mount(&mock_server)
            .await;

        let mut backend = backend(&mock_server);
        assert_eq!(backend.get_setting("migration_mode").await.unwrap(), "true");
        assert!(matches!(
            backend.get_setting("unknown").await,
            Err(StateError::InvalidSetting(_))
        ));
    }
}
