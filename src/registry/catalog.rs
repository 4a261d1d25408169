//! Administrative catalog queries shared by the registry and the pool cache.

use crate::error::{GatewayError, Result};
use crate::identifier::{quote_ident, SchemaName, ADMIN_SCHEMA};
use tokio_postgres::Client;

pub(crate) const CATALOG_TABLE: &str = "schemas";

/// Quoted `tenant_gateway.schemas`.
pub(crate) fn catalog_table() -> String {
    format!("{}.{}", quote_ident(ADMIN_SCHEMA), quote_ident(CATALOG_TABLE))
}

pub(crate) async fn ensure_catalog(client: &Client) -> Result<()> {
    let sql = format!(
        r#"
        CREATE SCHEMA IF NOT EXISTS {schema};
        CREATE TABLE IF NOT EXISTS {table} (
            name TEXT PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
        schema = quote_ident(ADMIN_SCHEMA),
        table = catalog_table(),
    );

    client
        .batch_execute(&sql)
        .await
        .map_err(|e| GatewayError::storage(ADMIN_SCHEMA, "create catalog", e))
}

/// A schema counts as registered only if both its catalog row and its namespace exist.
pub(crate) async fn is_registered(client: &Client, schema: &SchemaName) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS (
            SELECT 1 FROM {} s
            JOIN pg_catalog.pg_namespace n ON n.nspname = s.name
            WHERE s.name = $1
        )",
        catalog_table()
    );

    let row = client
        .query_one(&sql, &[&schema.as_str()])
        .await
        .map_err(|e| GatewayError::storage(schema.as_str(), "check schema", e))?;

    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_table_is_quoted() {
        assert_eq!(catalog_table(), "\"tenant_gateway\".\"schemas\"");
    }
}
