//! Tenant service
//!
//! Entry point for callers such as the HTTP layer: wires the registry, table
//! initializer, exporter and migrator together and reports each operation to
//! the activity sink.

use crate::activity::{ActivityEvent, EventSink, Operation};
use crate::error::Result;
use crate::pool::PoolManager;
use crate::registry::{SchemaRecord, SchemaRegistry};
use crate::schema::{ExportSnapshot, Exporter, InitResult, MigrationResult, Migrator, TableInitializer};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub struct TenantService {
    pool_manager: Arc<PoolManager>,
    registry: Arc<SchemaRegistry>,
    initializer: TableInitializer,
    exporter: Exporter,
    migrator: Migrator,
    sink: Arc<dyn EventSink>,
}

impl TenantService {
    pub fn new(pool_manager: Arc<PoolManager>, sink: Arc<dyn EventSink>) -> Self {
        let registry = Arc::new(SchemaRegistry::new(pool_manager.clone()));

        Self {
            initializer: TableInitializer::new(pool_manager.clone(), registry.clone()),
            exporter: Exporter::new(pool_manager.clone(), registry.clone()),
            migrator: Migrator::new(pool_manager.clone(), registry.clone()),
            pool_manager,
            registry,
            sink,
        }
    }

    pub fn pool_manager(&self) -> &Arc<PoolManager> {
        &self.pool_manager
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Create the administrative catalog. Call once before serving requests.
    pub async fn bootstrap(&self) -> Result<()> {
        self.registry.ensure_catalog().await
    }

    pub async fn create_schema(&self, actor: Option<&str>, name: &str) -> Result<SchemaRecord> {
        let result = self.registry.create(name).await;
        self.report(Operation::CreateSchema, &[name], actor, &result, |record| {
            json!({ "created_at": record.created_at })
        });
        result
    }

    /// Create a schema and its managed tables in one call.
    pub async fn provision(
        &self,
        actor: Option<&str>,
        name: &str,
    ) -> Result<(SchemaRecord, InitResult)> {
        let record = self.create_schema(actor, name).await?;
        let init = self.initialize(actor, name).await?;
        Ok((record, init))
    }

    pub async fn schema_exists(&self, name: &str) -> Result<bool> {
        self.registry.exists(name).await
    }

    pub async fn get_schema(&self, name: &str) -> Result<SchemaRecord> {
        self.registry.get(name).await
    }

    pub async fn list_schemas(&self) -> Result<Vec<SchemaRecord>> {
        self.registry.list().await
    }

    pub async fn drop_schema(&self, actor: Option<&str>, name: &str) -> Result<()> {
        let result = self.registry.drop_schema(name).await;
        self.report(Operation::DropSchema, &[name], actor, &result, |_| JsonValue::Null);
        result
    }

    pub async fn initialize(&self, actor: Option<&str>, name: &str) -> Result<InitResult> {
        let result = self.initializer.initialize(name).await;
        self.report(Operation::InitializeTables, &[name], actor, &result, |init| {
            json!({
                "tables_created": init.tables_created,
                "tables_existing": init.tables_existing,
                "warnings": init.warnings.len(),
                "diverged": init.has_divergence(),
            })
        });
        result
    }

    pub async fn export(&self, actor: Option<&str>, name: &str) -> Result<ExportSnapshot> {
        let result = self.exporter.export(name).await;
        self.report(Operation::ExportSchema, &[name], actor, &result, |snapshot| {
            let counts: serde_json::Map<String, JsonValue> = snapshot
                .tables
                .iter()
                .map(|(table, rows)| (table.clone(), json!(rows.len())))
                .collect();
            json!({ "rows": counts })
        });
        result
    }

    pub async fn migrate(
        &self,
        actor: Option<&str>,
        source: &str,
        target: &str,
    ) -> Result<MigrationResult> {
        let result = self.migrator.migrate(source, target).await;

        // A completed call with failed tables is still reported as unsuccessful
        let success = matches!(&result, Ok(r) if r.success);
        let detail = match &result {
            Ok(r) => json!({
                "copied": r.copied,
                "conflicts": r.conflicts,
                "errors": r.errors,
            }),
            Err(e) => json!({ "error": e.kind(), "message": e.to_string() }),
        };
        self.sink.emit(ActivityEvent::new(
            Operation::MigrateSchema,
            &[source, target],
            actor,
            success,
            detail,
        ));

        result
    }

    fn report<T>(
        &self,
        operation: Operation,
        schemas: &[&str],
        actor: Option<&str>,
        result: &Result<T>,
        detail: impl FnOnce(&T) -> JsonValue,
    ) {
        let (success, detail) = match result {
            Ok(value) => (true, detail(value)),
            Err(e) => (false, json!({ "error": e.kind(), "message": e.to_string() })),
        };
        self.sink
            .emit(ActivityEvent::new(operation, schemas, actor, success, detail));
    }
}
