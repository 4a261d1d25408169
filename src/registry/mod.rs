//! Schema Registry
//!
//! Tracks provisioned tenant schemas. Each managed schema has one row in the
//! administrative catalog and one PostgreSQL namespace of the same name:
//!
//! ```text
//! tenant_gateway.schemas
//!   name        TEXT PRIMARY KEY      -- validated schema name
//!   created_at  TIMESTAMPTZ NOT NULL
//! ```

pub(crate) mod catalog;
mod schema;

pub use schema::{SchemaRecord, SchemaRegistry};
