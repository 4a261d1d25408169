//! Managed Table Definition
//!
//! The fixed set of tables every tenant schema carries. The definition is
//! static configuration: it is not stored per schema, and the same DDL is
//! applied everywhere.

use crate::identifier::{quote_ident, SchemaName};
use serde::Serialize;

/// One column of a managed table.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDefinition {
    pub name: &'static str,
    /// SQL type used in `CREATE TABLE`.
    pub sql_type: &'static str,
    /// `information_schema.columns.data_type` the live column must report.
    pub catalog_type: &'static str,
    pub nullable: bool,
    /// Trailing column constraint / default clause.
    pub constraint: Option<&'static str>,
    /// Whether migration copies this column. Others are regenerated by the target.
    pub migrated: bool,
}

/// A table every tenant schema must contain.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedTable {
    pub name: &'static str,
    /// Monotonic primary key used for deterministic ordering and paging.
    pub primary_key: &'static str,
    /// Natural unique key used for migration conflict detection.
    pub unique_key: &'static str,
    pub columns: &'static [ColumnDefinition],
}

pub const USERS_TABLE: ManagedTable = ManagedTable {
    name: "users",
    primary_key: "id",
    unique_key: "email",
    columns: &[
        ColumnDefinition {
            name: "id",
            sql_type: "BIGSERIAL",
            catalog_type: "bigint",
            nullable: false,
            constraint: Some("PRIMARY KEY"),
            migrated: false,
        },
        ColumnDefinition {
            name: "name",
            sql_type: "VARCHAR(255)",
            catalog_type: "character varying",
            nullable: false,
            constraint: None,
            migrated: true,
        },
        ColumnDefinition {
            name: "email",
            sql_type: "VARCHAR(255)",
            catalog_type: "character varying",
            nullable: false,
            constraint: Some("UNIQUE"),
            migrated: true,
        },
        ColumnDefinition {
            name: "age",
            sql_type: "INTEGER",
            catalog_type: "integer",
            nullable: true,
            constraint: Some("CHECK (age >= 1 AND age <= 150)"),
            migrated: true,
        },
        ColumnDefinition {
            name: "created_at",
            sql_type: "TIMESTAMPTZ",
            catalog_type: "timestamp with time zone",
            nullable: false,
            constraint: Some("DEFAULT NOW()"),
            migrated: false,
        },
        ColumnDefinition {
            name: "updated_at",
            sql_type: "TIMESTAMPTZ",
            catalog_type: "timestamp with time zone",
            nullable: false,
            constraint: Some("DEFAULT NOW()"),
            migrated: false,
        },
    ],
};

/// Tables in creation order.
pub const MANAGED_TABLES: &[ManagedTable] = &[USERS_TABLE];

impl ManagedTable {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn migrated_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.migrated)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table inside `schema`.
    pub fn create_sql(&self, schema: &SchemaName) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut col = format!("{} {}", quote_ident(c.name), c.sql_type);
                if !c.nullable {
                    col.push_str(" NOT NULL");
                }
                if let Some(constraint) = c.constraint {
                    col.push(' ');
                    col.push_str(constraint);
                }
                col
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            schema.qualify(self.name),
            columns.join(",\n    ")
        )
    }

    /// Keyset page of rows as jsonb, ordered by primary key. `$1` is the last
    /// key seen, `$2` the page size.
    pub fn select_page_sql(&self, schema: &SchemaName) -> String {
        let pk = quote_ident(self.primary_key);
        format!(
            "SELECT t.{pk}, to_jsonb(t) FROM {table} t WHERE t.{pk} > $1 ORDER BY t.{pk} LIMIT $2",
            pk = pk,
            table = schema.qualify(self.name),
        )
    }

    /// Opening page of a keyset scan. Has no lower bound, so any key value
    /// (zero and negatives included) is reachable.
    pub fn select_first_page_sql(&self, schema: &SchemaName) -> String {
        let pk = quote_ident(self.primary_key);
        format!(
            "SELECT t.{pk}, to_jsonb(t) FROM {table} t ORDER BY t.{pk} LIMIT $1",
            pk = pk,
            table = schema.qualify(self.name),
        )
    }

    /// Insert of one jsonb row carrying only migrated columns. Returns zero
    /// affected rows when the unique key already exists in `schema`.
    pub fn insert_migrated_sql(&self, schema: &SchemaName) -> String {
        let columns: Vec<String> = self.migrated_columns().map(|c| quote_ident(c.name)).collect();
        let columns = columns.join(", ");
        let table = schema.qualify(self.name);

        format!(
            "INSERT INTO {table} ({columns}) \
             SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
             ON CONFLICT ({unique}) DO NOTHING",
            table = table,
            columns = columns,
            unique = quote_ident(self.unique_key),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::validate;

    #[test]
    fn test_users_definition() {
        assert_eq!(USERS_TABLE.name, "users");
        assert!(USERS_TABLE.column(USERS_TABLE.primary_key).is_some());
        assert!(USERS_TABLE.column(USERS_TABLE.unique_key).is_some());
        assert!(USERS_TABLE.column("age").unwrap().nullable);

        let migrated: Vec<&str> = USERS_TABLE.migrated_columns().map(|c| c.name).collect();
        assert_eq!(migrated, vec!["name", "email", "age"]);
    }

    #[test]
    fn test_create_sql() {
        let schema = validate("tenant_a").unwrap();
        let sql = USERS_TABLE.create_sql(&schema);

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"tenant_a\".\"users\""));
        assert!(sql.contains("\"id\" BIGSERIAL NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"email\" VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("\"age\" INTEGER CHECK (age >= 1 AND age <= 150)"));
        assert!(sql.contains("\"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
    }

    #[test]
    fn test_page_and_insert_sql() {
        let schema = validate("tenant_b").unwrap();

        let select = USERS_TABLE.select_page_sql(&schema);
        assert_eq!(
            select,
            "SELECT t.\"id\", to_jsonb(t) FROM \"tenant_b\".\"users\" t WHERE t.\"id\" > $1 ORDER BY t.\"id\" LIMIT $2"
        );

        let first = USERS_TABLE.select_first_page_sql(&schema);
        assert_eq!(
            first,
            "SELECT t.\"id\", to_jsonb(t) FROM \"tenant_b\".\"users\" t ORDER BY t.\"id\" LIMIT $1"
        );
        assert!(!first.contains("WHERE"));

        let insert = USERS_TABLE.insert_migrated_sql(&schema);
        assert!(insert.starts_with("INSERT INTO \"tenant_b\".\"users\" (\"name\", \"email\", \"age\")"));
        assert!(insert.contains("jsonb_populate_record(NULL::\"tenant_b\".\"users\", $1)"));
        assert!(insert.ends_with("ON CONFLICT (\"email\") DO NOTHING"));
        assert!(!insert.contains("\"id\""));
    }
}
