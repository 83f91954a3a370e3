use super::{
    default_setting, BackendKind, CommitBatch, MigrationStateBackend, StateError, VersionChange,
};
use crate::bulk::BulkBuilder;
use crate::catalog::{CatalogStore, CliState, MigrationRecord};
use crate::client::{is_sql, RunSqlStyle, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Applied versions kept in the cli catalog state.
///
/// The last state read is cached; writes carry its revision + 1 and are
/// refused when the server's revision moved in between.
///
/// Schema SQL goes through `v2/query` scoped to the source, everything
/// else (metadata and the state write) through `v1/metadata`.
pub struct CatalogStateBackend {
    store: CatalogStore,
    path: String,
    query_path: String,
    source: String,
    state: CliState,
    pending: Option<CliState>,
}

impl CatalogStateBackend {
    pub fn new(
        transport: Arc<dyn Transport>,
        path: impl Into<String>,
        query_path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            store: CatalogStore::new(transport, path.clone()),
            path,
            query_path: query_path.into(),
            source: source.into(),
            state: CliState::default(),
            pending: None,
        }
    }

    /// Last state read or written.
    pub fn state(&self) -> &CliState {
        &self.state
    }

    async fn refresh(&mut self) -> Result<&CliState, StateError> {
        self.state = self.store.get_cli_state().await?.upgrade();
        Ok(&self.state)
    }
}

fn apply_changes(state: &mut CliState, changes: &[VersionChange]) {
    for change in changes {
        match change {
            VersionChange::Insert { version, name } => {
                state.insert(MigrationRecord::new(*version, name.clone()))
            }
            VersionChange::Remove(version) => {
                state.remove(*version);
            }
        }
    }
}

#[async_trait]
impl MigrationStateBackend for CatalogStateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CatalogState
    }

    async fn prepare(&mut self) -> Result<(), StateError> {
        let current = self.store.get_cli_state().await?;
        if !current.needs_upgrade() {
            self.state = current.upgrade();
            return Ok(());
        }

        // Legacy and missing state both count as revision 0
        let upgraded = current.upgrade();
        self.state = self.store.set_checked(&upgraded).await?;
        info!(revision = self.state.revision, "Initialized cli catalog state");
        Ok(())
    }

    async fn applied_versions(&mut self) -> Result<Vec<MigrationRecord>, StateError> {
        Ok(self.refresh().await?.schema_migrations.clone())
    }

    fn run_sql_style(&self) -> RunSqlStyle {
        RunSqlStyle::V2Query {
            source: self.source.clone(),
        }
    }

    fn split_commit(&self, bulk: BulkBuilder) -> Vec<CommitBatch> {
        let style = self.run_sql_style();
        bulk.split_by(is_sql)
            .into_iter()
            .map(|(sql, bulk)| {
                if sql {
                    CommitBatch {
                        path: self.query_path.clone(),
                        source: style.bulk_source().map(str::to_string),
                        bulk,
                    }
                } else {
                    CommitBatch {
                        path: self.path.clone(),
                        source: None,
                        bulk,
                    }
                }
            })
            .collect()
    }

    async fn stage_bookkeeping(
        &mut self,
        changes: &[VersionChange],
        bulk: &mut BulkBuilder,
    ) -> Result<(), StateError> {
        self.store.check_revision(self.state.revision).await?;

        let mut next = self.state.clone();
        apply_changes(&mut next, changes);
        next.revision += 1;
        debug!(
            revision = next.revision,
            changes = changes.len(),
            "Staging cli state write"
        );

        bulk.append_unattributed(CatalogStore::set_operation(&next)?);
        self.pending = Some(next);
        Ok(())
    }

    fn committed(&mut self) {
        if let Some(next) = self.pending.take() {
            self.state = next;
        }
    }

    fn aborted(&mut self) {
        if self.pending.take().is_some() {
            debug!(revision = self.state.revision, "Dropped staged cli state write");
        }
    }

    async fn get_setting(&mut self, name: &str) -> Result<String, StateError> {
        default_setting(name)?;
        let state = self.refresh().await?;
        Ok(state.migration_settings.migration_mode.clone())
    }

    async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), StateError> {
        default_setting(name)?;
        self.refresh().await?;

        let mut next = self.state.clone();
        next.migration_settings.migration_mode = value.to_string();
        self.state = self.store.set_checked(&next).await?;
        info!(setting = %name, value = %value, "Updated migration setting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::client::HttpTransport;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> CatalogStateBackend {
        let transport = HttpTransport::new(&server.uri()).unwrap();
        CatalogStateBackend::new(Arc::new(transport), "v1/metadata", "v2/query", "")
    }

    async fn mount_state(server: &MockServer, state: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/v1/metadata"))
            .and(body_partial_json(json!({"type": "get_catalog_state"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc",
                "cli_state": state
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_prepare_upgrades_legacy_state() {
        let mock_server = MockServer::start().await;
        mount_state(&mock_server, json!({"schema_migrations": {}})).await;
        Mock::given(method("POST"))
            .and(path("/v1/metadata"))
            .and(body_partial_json(json!({
                "type": "set_catalog_state",
                "args": {"type": "cli", "state": {"version": 2, "revision": 1}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "success"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut backend = backend(&mock_server);
        backend.prepare().await.unwrap();
        assert_eq!(backend.state().revision, 1);
    }

    #[tokio::test]
    async fn test_prepare_leaves_current_state_alone() {
        let mock_server = MockServer::start().await;
        mount_state(&mock_server, json!({"version": 2, "revision": 4})).await;
        Mock::given(method("POST"))
            .and(path("/v1/metadata"))
            .and(body_partial_json(json!({"type": "set_catalog_state"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut backend = backend(&mock_server);
        backend.prepare().await.unwrap();
        assert_eq!(backend.state().revision, 4);
    }

    #[tokio::test]
    async fn test_stage_bookkeeping_appends_state_write() {
        let mock_server = MockServer::start().await;
        mount_state(
            &mock_server,
            json!({"version": 2, "revision": 2, "schema_migrations": [{"version": 1000}]}),
        )
        .await;

        let mut backend = backend(&mock_server);
        backend.applied_versions().await.unwrap();

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
        let state = &request["args"][0]["args"]["state"];
        assert_eq!(request["args"][0]["type"], json!("set_catalog_state"));
        assert_eq!(state["revision"], json!(3));
        assert_eq!(
            state["schema_migrations"],
            json!([{"version": 2000, "name": "seed", "dirty": false}])
        );

        assert_eq!(backend.state().revision, 2);
        backend.committed();
        assert_eq!(backend.state().revision, 3);
    }

    #[tokio::test]
    async fn test_stage_bookkeeping_detects_concurrent_write() {
        let mock_server = MockServer::start().await;
        mount_state(&mock_server, json!({"version": 2, "revision": 8})).await;

        let mut backend = backend(&mock_server);
        let mut bulk = BulkBuilder::new();
        let result = backend
            .stage_bookkeeping(&[VersionChange::Remove(1)], &mut bulk)
            .await;

        assert!(matches!(
            result,
            Err(StateError::Catalog(CatalogError::ConcurrentModification {
                expected: 0,
                found: 8
            }))
        ));
        assert!(bulk.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_drops_staged_write() {
        let mock_server = MockServer::start().await;
        mount_state(&mock_server, json!({"version": 2, "revision": 5})).await;

        let mut backend = backend(&mock_server);
        backend.applied_versions().await.unwrap();

        let mut bulk = BulkBuilder::new();
        backend
            .stage_bookkeeping(&[VersionChange::Remove(1)], &mut bulk)
            .await
            .unwrap();
        backend.aborted();

        // a later commit without a state write must not pick up the old one
        backend.committed();
        assert_eq!(backend.state().revision, 5);
    }

    #[test]
    fn test_run_sql_style_uses_source() {
        let transport = HttpTransport::new("http://localhost:8080").unwrap();
        let backend =
            CatalogStateBackend::new(Arc::new(transport), "v1/metadata", "v2/query", "db2");
        assert_eq!(
            backend.run_sql_style(),
            RunSqlStyle::V2Query {
                source: "db2".to_string()
            }
        );
    }

    #[test]
    fn test_split_commit_routes_by_endpoint() {
        let transport = HttpTransport::new("http://localhost:8080").unwrap();
        let backend = CatalogStateBackend::new(Arc::new(transport), "v1/metadata", "v2/query", "");
        let style = backend.run_sql_style();

        let mut bulk = BulkBuilder::new();
        bulk.append(
            style.operation(crate::client::RunSqlArgs::new("CREATE TABLE a(id int)")),
            "1000_init.up.sql",
        );
        bulk.append(
            crate::client::Operation::new("pg_track_table", json!({"table": "a"})),
            "1000_init.up.yaml",
        );
        bulk.append_unattributed(crate::client::Operation::new(
            "set_catalog_state",
            json!({"type": "cli"}),
        ));

        let batches = backend.split_commit(bulk);
        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].path, "v2/query");
        assert_eq!(batches[0].source.as_deref(), Some("default"));
        let request = batches[0].request().unwrap();
        assert_eq!(request["source"], json!("default"));
        assert_eq!(request["args"][0]["type"], json!("run_sql"));

        assert_eq!(batches[1].path, "v1/metadata");
        assert_eq!(batches[1].source, None);
        assert_eq!(batches[1].bulk.len(), 2);
        assert_eq!(batches[1].bulk.file_for(0), Some("1000_init.up.yaml"));
        assert_eq!(batches[1].bulk.file_for(1), None);
    }
}
