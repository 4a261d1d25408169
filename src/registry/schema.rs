//! Schema Registry operations
//!
//! All statements here run on the administrative pool.

use crate::error::{GatewayError, Result};
use crate::identifier::{self, SchemaName};
use crate::pool::PoolManager;
use crate::registry::catalog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_postgres::Row;
use tracing::{debug, info};

/// A provisioned tenant schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl SchemaRecord {
    fn from_row(row: &Row) -> Self {
        Self {
            name: row.get(0),
            created_at: row.get(1),
        }
    }
}

pub struct SchemaRegistry {
    pool_manager: Arc<PoolManager>,
}

impl SchemaRegistry {
    pub fn new(pool_manager: Arc<PoolManager>) -> Self {
        Self { pool_manager }
    }

    /// Create the administrative catalog if it is missing. Run once at startup.
    pub async fn ensure_catalog(&self) -> Result<()> {
        let client = self.pool_manager.admin_client().await?;
        catalog::ensure_catalog(&client).await?;
        debug!("Administrative catalog ready");
        Ok(())
    }

    /// Provision a new schema.
    ///
    /// The catalog insert and `CREATE SCHEMA` share one transaction. A second
    /// concurrent caller for the same name blocks on the catalog's primary
    /// key and then fails with `AlreadyExists`.
    pub async fn create(&self, name: &str) -> Result<SchemaRecord> {
        let schema = identifier::validate(name)?;

        let mut client = self.pool_manager.admin_client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| GatewayError::storage(name, "begin", e))?;

        let insert = format!(
            "INSERT INTO {} (name) VALUES ($1) RETURNING name, created_at",
            catalog::catalog_table()
        );
        let row = tx
            .query_one(&insert, &[&schema.as_str()])
            .await
            .map_err(|e| match GatewayError::storage(name, "register schema", e) {
                GatewayError::UniqueConstraintConflict { .. } => GatewayError::AlreadyExists {
                    schema: name.to_string(),
                },
                other => other,
            })?;

        tx.batch_execute(&format!("CREATE SCHEMA {}", schema.quoted()))
            .await
            .map_err(|e| GatewayError::storage(name, "create schema", e))?;

        tx.commit()
            .await
            .map_err(|e| GatewayError::storage(name, "commit", e))?;

        let record = SchemaRecord::from_row(&row);
        info!("Created schema: {}", record.name);
        Ok(record)
    }

    /// Whether `name` is a provisioned schema. Malformed names are simply absent.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let schema = match identifier::validate(name) {
            Ok(schema) => schema,
            Err(_) => return Ok(false),
        };

        let client = self.pool_manager.admin_client().await?;
        catalog::is_registered(&client, &schema).await
    }

    /// Validate `name` and confirm it is provisioned.
    pub async fn require(&self, name: &str) -> Result<SchemaName> {
        let schema = identifier::validate(name)?;
        let client = self.pool_manager.admin_client().await?;

        if catalog::is_registered(&client, &schema).await? {
            Ok(schema)
        } else {
            Err(GatewayError::unknown_schema(name))
        }
    }

    /// Look up one schema's record.
    pub async fn get(&self, name: &str) -> Result<SchemaRecord> {
        let schema = identifier::validate(name)?;
        let client = self.pool_manager.admin_client().await?;

        let sql = format!(
            "SELECT s.name, s.created_at FROM {} s
             JOIN pg_catalog.pg_namespace n ON n.nspname = s.name
             WHERE s.name = $1",
            catalog::catalog_table()
        );

        let row = client
            .query_opt(&sql, &[&schema.as_str()])
            .await
            .map_err(|e| GatewayError::storage(name, "get schema", e))?;

        row.map(|r| SchemaRecord::from_row(&r))
            .ok_or_else(|| GatewayError::unknown_schema(name))
    }

    /// All provisioned schemas ordered by name.
    pub async fn list(&self) -> Result<Vec<SchemaRecord>> {
        let client = self.pool_manager.admin_client().await?;

        let sql = format!(
            "SELECT s.name, s.created_at FROM {} s
             JOIN pg_catalog.pg_namespace n ON n.nspname = s.name
             ORDER BY s.name",
            catalog::catalog_table()
        );

        let rows = client
            .query(&sql, &[])
            .await
            .map_err(|e| GatewayError::storage(identifier::ADMIN_SCHEMA, "list schemas", e))?;

        Ok(rows.iter().map(SchemaRecord::from_row).collect())
    }

    /// Drop a schema with all of its tables and forget its pool.
    pub async fn drop_schema(&self, name: &str) -> Result<()> {
        let schema = identifier::validate(name)?;

        let mut client = self.pool_manager.admin_client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| GatewayError::storage(name, "begin", e))?;

        let delete = format!("DELETE FROM {} WHERE name = $1", catalog::catalog_table());
        let deleted = tx
            .execute(&delete, &[&schema.as_str()])
            .await
            .map_err(|e| GatewayError::storage(name, "unregister schema", e))?;

        if deleted == 0 {
            return Err(GatewayError::unknown_schema(name));
        }

        tx.batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema.quoted()))
            .await
            .map_err(|e| GatewayError::storage(name, "drop schema", e))?;

        tx.commit()
            .await
            .map_err(|e| GatewayError::storage(name, "commit", e))?;

        self.pool_manager.forget(&schema);
        info!("Dropped schema: {}", schema);
        Ok(())
    }
}
