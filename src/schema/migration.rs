//! Cross-schema data migration
//!
//! Copies rows of every managed table from a source schema into the matching
//! table of a target schema. Each table is copied inside one transaction on
//! the target, so a failure leaves that table untouched; other tables still
//! proceed. Rows whose unique key already exists in the target are skipped
//! and reported as conflicts.
//!
//! Only columns marked `migrated` are copied. Primary keys and timestamps are
//! regenerated by the target.

use crate::error::{GatewayError, Result};
use crate::identifier::SchemaName;
use crate::pool::{PoolManager, SchemaClient, SchemaPool};
use crate::registry::SchemaRegistry;
use crate::schema::definition::{ManagedTable, MANAGED_TABLES};
use crate::schema::export::RowPager;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Report of one migrate call
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    pub source: String,
    pub target: String,
    /// Rows inserted per table
    pub copied: BTreeMap<String, u64>,
    /// Rows skipped per table because their unique key exists in the target
    pub conflicts: BTreeMap<String, u64>,
    /// Unique key values of the skipped rows, per table
    pub conflicting_keys: BTreeMap<String, Vec<String>>,
    /// Tables whose copy failed and was rolled back
    pub errors: BTreeMap<String, String>,
    pub success: bool,
}

impl MigrationResult {
    pub fn total_copied(&self) -> u64 {
        self.copied.values().sum()
    }

    pub fn total_conflicts(&self) -> u64 {
        self.conflicts.values().sum()
    }

    fn record(&mut self, table: &str, outcome: std::result::Result<TableCopy, GatewayError>) {
        match outcome {
            Ok(copy) => {
                self.copied.insert(table.to_string(), copy.copied);
                self.conflicts.insert(table.to_string(), copy.conflicting_keys.len() as u64);
                if !copy.conflicting_keys.is_empty() {
                    self.conflicting_keys
                        .insert(table.to_string(), copy.conflicting_keys);
                }
            }
            Err(e) => {
                self.copied.insert(table.to_string(), 0);
                self.conflicts.insert(table.to_string(), 0);
                self.errors.insert(table.to_string(), e.to_string());
            }
        }
        self.success = self.errors.is_empty();
    }
}

#[derive(Debug, Default)]
struct TableCopy {
    copied: u64,
    conflicting_keys: Vec<String>,
}

pub struct Migrator {
    pool_manager: Arc<PoolManager>,
    registry: Arc<SchemaRegistry>,
    page_size: i64,
}

impl Migrator {
    pub fn new(pool_manager: Arc<PoolManager>, registry: Arc<SchemaRegistry>) -> Self {
        let page_size = pool_manager.config().export_page_size;
        Self {
            pool_manager,
            registry,
            page_size,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Copy all managed tables from `source` into `target`.
    ///
    /// Both schemas must already exist; the target is never auto-created.
    pub async fn migrate(&self, source: &str, target: &str) -> Result<MigrationResult> {
        if source == target {
            return Err(GatewayError::InvalidRequest {
                message: format!("Source and target schema are both '{}'", source),
            });
        }

        let source_schema = self.registry.require(source).await?;
        let target_schema = self.registry.require(target).await?;

        let source_pool = self.pool_manager.get_pool_for(&source_schema).await?;
        let target_pool = self.pool_manager.get_pool_for(&target_schema).await?;

        let mut result = MigrationResult {
            source: source_schema.to_string(),
            target: target_schema.to_string(),
            success: true,
            ..Default::default()
        };

        for table in MANAGED_TABLES {
            let outcome = self
                .copy_table(&source_pool, &target_pool, table)
                .await;

            match &outcome {
                Ok(copy) => info!(
                    "Migrated {}.{} -> {}.{}: {} copied, {} conflicts",
                    source_schema,
                    table.name,
                    target_schema,
                    table.name,
                    copy.copied,
                    copy.conflicting_keys.len()
                ),
                Err(e) => warn!(
                    "Migration of table {} from {} to {} rolled back: {}",
                    table.name, source_schema, target_schema, e
                ),
            }

            result.record(table.name, outcome);
        }

        Ok(result)
    }

    async fn copy_table(
        &self,
        source_pool: &SchemaPool,
        target_pool: &SchemaPool,
        table: &ManagedTable,
    ) -> Result<TableCopy> {
        let source: &SchemaName = source_pool.schema();
        let target: &SchemaName = target_pool.schema();

        let (mut source_client, mut target_client) = checkout_pair(source_pool, target_pool).await?;

        let mut pager = RowPager::open(&mut source_client, source, table, self.page_size).await?;

        let tx = target_client
            .transaction()
            .await
            .map_err(|e| GatewayError::storage_on_table(target.as_str(), table.name, "begin", e))?;

        let insert = tx
            .prepare(&table.insert_migrated_sql(target))
            .await
            .map_err(|e| GatewayError::storage_on_table(target.as_str(), table.name, "prepare insert", e))?;

        let mut copy = TableCopy::default();

        while let Some(page) = pager.next_page().await? {
            debug!("Copying page of {} rows into {}.{}", page.len(), target, table.name);

            for row in page {
                let key = row.get(table.unique_key).map(key_text).unwrap_or_default();
                let value = JsonValue::Object(row);

                let inserted = tx.execute(&insert, &[&value]).await.map_err(|e| {
                    GatewayError::storage_on_table(target.as_str(), table.name, "insert row", e)
                })?;

                if inserted == 0 {
                    copy.conflicting_keys.push(key);
                } else {
                    copy.copied += inserted;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| GatewayError::storage_on_table(target.as_str(), table.name, "commit", e))?;

        Ok(copy)
    }
}

/// Check out one client from each pool, always taking the lower schema name
/// first so opposite-direction migrations cannot each hold one pool while
/// waiting on the other.
async fn checkout_pair(
    source_pool: &SchemaPool,
    target_pool: &SchemaPool,
) -> Result<(SchemaClient, SchemaClient)> {
    if source_pool.schema().as_str() <= target_pool.schema().as_str() {
        let source = source_pool.client().await?;
        let target = target_pool.client().await?;
        Ok((source, target))
    } else {
        let target = target_pool.client().await?;
        let source = source_pool.client().await?;
        Ok((source, target))
    }
}

fn key_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_success_and_conflicts() {
        let mut result = MigrationResult {
            success: true,
            ..Default::default()
        };

        result.record(
            "users",
            Ok(TableCopy {
                copied: 3,
                conflicting_keys: vec!["ana@x.com".to_string()],
            }),
        );

        assert!(result.success);
        assert_eq!(result.copied["users"], 3);
        assert_eq!(result.conflicts["users"], 1);
        assert_eq!(result.conflicting_keys["users"], vec!["ana@x.com"]);
        assert_eq!(result.total_copied(), 3);
        assert_eq!(result.total_conflicts(), 1);
    }

    #[test]
    fn test_record_failure_marks_table() {
        let mut result = MigrationResult {
            success: true,
            ..Default::default()
        };

        result.record("users", Ok(TableCopy::default()));
        result.record(
            "orders",
            Err(GatewayError::PoolTimeout {
                schema: "tenant_b".to_string(),
            }),
        );

        assert!(!result.success);
        assert_eq!(result.copied["orders"], 0);
        assert!(result.errors["orders"].contains("tenant_b"));
        assert!(!result.conflicting_keys.contains_key("users"));
        assert_eq!(result.conflicts["users"], 0);
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text(&json!("ana@x.com")), "ana@x.com");
        assert_eq!(key_text(&json!(42)), "42");
    }
}
