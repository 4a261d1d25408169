//! Table initializer
//!
//! Applies the managed table definition inside a tenant schema with
//! `CREATE TABLE IF NOT EXISTS`, so it is safe to run at provisioning time and
//! again later as a repair. Existing tables are never altered; when the live
//! shape differs from the definition the differences come back as warnings.

use crate::error::{GatewayError, Result};
use crate::identifier::SchemaName;
use crate::pool::PoolManager;
use crate::registry::SchemaRegistry;
use crate::schema::definition::{ManagedTable, MANAGED_TABLES};
use serde::Serialize;
use std::sync::Arc;
use tokio_postgres::GenericClient;
use tracing::{debug, info, warn};

/// Outcome of one initialize call
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitResult {
    pub schema: String,
    pub tables_created: Vec<String>,
    pub tables_existing: Vec<String>,
    pub warnings: Vec<TableMismatch>,
}

impl InitResult {
    pub fn has_divergence(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// One difference between a live table and its managed definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMismatch {
    pub table: String,
    pub column: String,
    pub issue: String,
}

/// A column as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

pub struct TableInitializer {
    pool_manager: Arc<PoolManager>,
    registry: Arc<SchemaRegistry>,
}

impl TableInitializer {
    pub fn new(pool_manager: Arc<PoolManager>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            pool_manager,
            registry,
        }
    }

    pub async fn initialize(&self, name: &str) -> Result<InitResult> {
        let schema = self.registry.require(name).await?;

        let mut client = self.pool_manager.admin_client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| GatewayError::storage(name, "begin", e))?;

        // Serialise concurrent initializations of the same schema
        tx.execute(
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            &[&format!("tenant_gateway:init:{}", schema)],
        )
        .await
        .map_err(|e| GatewayError::storage(name, "lock schema", e))?;

        let mut result = InitResult {
            schema: schema.to_string(),
            ..Default::default()
        };

        for table in MANAGED_TABLES {
            let existed = table_exists(&*tx, &schema, table.name).await?;

            if existed {
                debug!("Table {}.{} already exists", schema, table.name);
                result.tables_existing.push(table.name.to_string());
            } else {
                tx.batch_execute(&table.create_sql(&schema))
                    .await
                    .map_err(|e| {
                        GatewayError::storage_on_table(name, table.name, "create table", e)
                    })?;
                info!("Created table {}.{}", schema, table.name);
                result.tables_created.push(table.name.to_string());
            }

            let live = live_columns(&*tx, &schema, table.name).await?;
            let mismatches = diff_columns(table, &live);
            for m in &mismatches {
                warn!(
                    "Table {}.{} diverges from its definition: {} ({})",
                    schema, m.table, m.column, m.issue
                );
            }
            result.warnings.extend(mismatches);
        }

        tx.commit()
            .await
            .map_err(|e| GatewayError::storage(name, "commit", e))?;

        info!(
            "Initialized schema {}: {} created, {} existing, {} warnings",
            schema,
            result.tables_created.len(),
            result.tables_existing.len(),
            result.warnings.len()
        );

        Ok(result)
    }
}

async fn table_exists<C: GenericClient + Sync>(
    client: &C,
    schema: &SchemaName,
    table: &str,
) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
            &[&schema.as_str(), &table],
        )
        .await
        .map_err(|e| GatewayError::storage_on_table(schema.as_str(), table, "check table", e))?;

    Ok(row.get(0))
}

async fn live_columns<C: GenericClient + Sync>(
    client: &C,
    schema: &SchemaName,
    table: &str,
) -> Result<Vec<LiveColumn>> {
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text, is_nullable::text = 'YES'
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&schema.as_str(), &table],
        )
        .await
        .map_err(|e| GatewayError::storage_on_table(schema.as_str(), table, "read columns", e))?;

    Ok(rows
        .iter()
        .map(|row| LiveColumn {
            name: row.get(0),
            data_type: row.get(1),
            nullable: row.get(2),
        })
        .collect())
}

/// Compare live columns against the managed definition.
pub fn diff_columns(table: &ManagedTable, live: &[LiveColumn]) -> Vec<TableMismatch> {
    let mut mismatches = Vec::new();
    let mismatch = |column: &str, issue: String| TableMismatch {
        table: table.name.to_string(),
        column: column.to_string(),
        issue,
    };

    for expected in table.columns {
        match live.iter().find(|c| c.name == expected.name) {
            None => mismatches.push(mismatch(expected.name, "missing column".to_string())),
            Some(found) => {
                if !found.data_type.eq_ignore_ascii_case(expected.catalog_type) {
                    mismatches.push(mismatch(
                        expected.name,
                        format!(
                            "type is {} but definition expects {}",
                            found.data_type, expected.catalog_type
                        ),
                    ));
                }
                if found.nullable != expected.nullable {
                    let issue = if expected.nullable {
                        "column is NOT NULL but definition allows NULL"
                    } else {
                        "column allows NULL but definition requires NOT NULL"
                    };
                    mismatches.push(mismatch(expected.name, issue.to_string()));
                }
            }
        }
    }

    for extra in live.iter().filter(|c| table.column(&c.name).is_none()) {
        mismatches.push(mismatch(&extra.name, "column is not in the definition".to_string()));
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition::USERS_TABLE;

    fn live_from_definition(table: &ManagedTable) -> Vec<LiveColumn> {
        table
            .columns
            .iter()
            .map(|c| LiveColumn {
                name: c.name.to_string(),
                data_type: c.catalog_type.to_string(),
                nullable: c.nullable,
            })
            .collect()
    }

    #[test]
    fn test_matching_table_has_no_warnings() {
        let live = live_from_definition(&USERS_TABLE);
        assert!(diff_columns(&USERS_TABLE, &live).is_empty());
    }

    #[test]
    fn test_missing_and_extra_columns() {
        let mut live = live_from_definition(&USERS_TABLE);
        live.retain(|c| c.name != "age");
        live.push(LiveColumn {
            name: "nickname".to_string(),
            data_type: "text".to_string(),
            nullable: true,
        });

        let warnings = diff_columns(&USERS_TABLE, &live);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].column, "age");
        assert_eq!(warnings[0].issue, "missing column");
        assert_eq!(warnings[1].column, "nickname");
        assert!(warnings.iter().all(|w| w.table == "users"));
    }

    #[test]
    fn test_type_and_nullability_drift() {
        let mut live = live_from_definition(&USERS_TABLE);
        for c in live.iter_mut() {
            if c.name == "age" {
                c.data_type = "smallint".to_string();
            }
            if c.name == "name" {
                c.nullable = true;
            }
        }

        let warnings = diff_columns(&USERS_TABLE, &live);
        assert_eq!(warnings.len(), 2);
        assert!(warnings
            .iter()
            .any(|w| w.column == "name" && w.issue.contains("allows NULL")));
        assert!(warnings
            .iter()
            .any(|w| w.column == "age" && w.issue.contains("smallint")));
    }
}
