//! Schema exporter
//!
//! Reads every managed table of a schema, ordered by primary key, into an
//! [`ExportSnapshot`]. Rows are fetched in keyset pages inside one read-only
//! REPEATABLE READ transaction so every page sees the same snapshot.

use crate::error::{GatewayError, Result};
use crate::identifier::SchemaName;
use crate::pool::{PoolManager, SchemaClient};
use crate::registry::SchemaRegistry;
use crate::schema::definition::{ManagedTable, MANAGED_TABLES};
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::IsolationLevel;
use tracing::{debug, info, warn};

/// One row, keyed by column name
pub type RowRecord = Map<String, JsonValue>;

/// Point-in-time contents of a schema's managed tables
#[derive(Debug, Clone, Serialize)]
pub struct ExportSnapshot {
    pub schema: String,
    pub exported_at: DateTime<Utc>,
    pub tables: BTreeMap<String, Vec<RowRecord>>,
}

impl ExportSnapshot {
    pub fn rows(&self, table: &str) -> &[RowRecord] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }
}

/// Keyset pager over one table, holding a read-only snapshot transaction.
pub(crate) struct RowPager<'a> {
    tx: Transaction<'a>,
    schema: &'a SchemaName,
    table: &'a ManagedTable,
    first_sql: String,
    next_sql: String,
    /// `None` until the first page has been read.
    last_key: Option<i64>,
    page_size: i64,
    exhausted: bool,
}

impl<'a> RowPager<'a> {
    pub(crate) async fn open(
        client: &'a mut SchemaClient,
        schema: &'a SchemaName,
        table: &'a ManagedTable,
        page_size: i64,
    ) -> Result<RowPager<'a>> {
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(|e| GatewayError::storage_on_table(schema.as_str(), table.name, "begin read", e))?;

        Ok(RowPager {
            tx,
            schema,
            table,
            first_sql: table.select_first_page_sql(schema),
            next_sql: table.select_page_sql(schema),
            last_key: None,
            page_size: page_size.max(1),
            exhausted: false,
        })
    }

    /// Next page of rows, or `None` once the table is exhausted.
    pub(crate) async fn next_page(&mut self) -> Result<Option<Vec<RowRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        let rows = match self.last_key {
            None => {
                self.tx
                    .query(self.first_sql.as_str(), &[&self.page_size])
                    .await
            }
            Some(key) => {
                self.tx
                    .query(self.next_sql.as_str(), &[&key, &self.page_size])
                    .await
            }
        }
        .map_err(|e| {
            GatewayError::storage_on_table(self.schema.as_str(), self.table.name, "read rows", e)
        })?;

        if (rows.len() as i64) < self.page_size {
            self.exhausted = true;
        }

        let Some(last) = rows.last() else {
            return Ok(None);
        };
        self.last_key = Some(last.get(0));

        let page = rows
            .iter()
            .filter_map(|row| match row.get::<_, JsonValue>(1) {
                JsonValue::Object(map) => Some(map),
                other => {
                    warn!(
                        "Skipping non-object row in {}.{}: {}",
                        self.schema, self.table.name, other
                    );
                    None
                }
            })
            .collect();

        Ok(Some(page))
    }
}

pub struct Exporter {
    pool_manager: Arc<PoolManager>,
    registry: Arc<SchemaRegistry>,
    page_size: i64,
}

impl Exporter {
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

    pub async fn export(&self, name: &str) -> Result<ExportSnapshot> {
        let schema = self.registry.require(name).await?;
        let pool = self.pool_manager.get_pool_for(&schema).await?;
        let mut client = pool.client().await?;

        let mut tables = BTreeMap::new();
        for table in MANAGED_TABLES {
            let rows = read_table(&mut client, &schema, table, self.page_size).await?;
            debug!("Exported {} rows from {}.{}", rows.len(), schema, table.name);
            tables.insert(table.name.to_string(), rows);
        }

        let snapshot = ExportSnapshot {
            schema: schema.to_string(),
            exported_at: Utc::now(),
            tables,
        };

        info!(
            "Exported schema {} ({} tables)",
            snapshot.schema,
            snapshot.tables.len()
        );
        Ok(snapshot)
    }
}

async fn read_table(
    client: &mut SchemaClient,
    schema: &SchemaName,
    table: &ManagedTable,
    page_size: i64,
) -> Result<Vec<RowRecord>> {
    let mut pager = RowPager::open(client, schema, table, page_size).await?;
    let mut rows = Vec::new();

    while let Some(page) = pager.next_page().await? {
        rows.extend(page);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64, email: &str) -> RowRecord {
        match json!({ "id": id, "name": "n", "email": email, "age": null }) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_snapshot_accessors() {
        let mut tables = BTreeMap::new();
        tables.insert("users".to_string(), vec![row(1, "a@x.com"), row(2, "b@x.com")]);

        let snapshot = ExportSnapshot {
            schema: "tenant_a".to_string(),
            exported_at: Utc::now(),
            tables,
        };

        assert_eq!(snapshot.row_count("users"), 2);
        assert_eq!(snapshot.rows("users")[1]["email"], "b@x.com");
        assert_eq!(snapshot.row_count("missing"), 0);
    }

    #[test]
    fn test_snapshot_serializes_tables_by_name() {
        let mut tables = BTreeMap::new();
        tables.insert("users".to_string(), vec![row(7, "ana@x.com")]);

        let snapshot = ExportSnapshot {
            schema: "tenant_a".to_string(),
            exported_at: Utc::now(),
            tables,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["schema"], "tenant_a");
        assert_eq!(value["tables"]["users"][0]["id"], 7);
        assert!(value["tables"]["users"][0]["age"].is_null());
    }
}
