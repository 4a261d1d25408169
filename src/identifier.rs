//! Schema name validation and identifier quoting
//!
//! PostgreSQL cannot bind identifiers as query parameters, so every schema
//! name that ends up in SQL text goes through [`validate`] first and is then
//! quoted with [`quote_ident`]. Nothing else in the crate formats identifiers.

use crate::error::{GatewayError, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Schema holding the gateway's own catalog. Never usable as a tenant name.
pub const ADMIN_SCHEMA: &str = "tenant_gateway";

pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Reserved words rejected as schema names (PostgreSQL reserved keywords
/// plus the handful of non-reserved ones that commonly confuse tooling).
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "binary", "both", "case", "cast", "check", "collate",
    "collation", "column", "concurrently", "constraint", "create", "cross",
    "current_catalog", "current_date", "current_role", "current_schema", "current_time",
    "current_timestamp", "current_user", "default", "deferrable", "delete", "desc",
    "distinct", "do", "drop", "else", "end", "except", "false", "fetch", "for", "foreign",
    "freeze", "from", "full", "grant", "group", "having", "ilike", "in", "initially",
    "inner", "insert", "intersect", "into", "is", "isnull", "join", "lateral", "leading",
    "left", "like", "limit", "localtime", "localtimestamp", "natural", "not", "notnull",
    "null", "offset", "on", "only", "or", "order", "outer", "overlaps", "placing",
    "primary", "references", "returning", "right", "schema", "select", "session_user",
    "similar", "some", "symmetric", "system_user", "table", "tablesample", "then", "to",
    "trailing", "true", "truncate", "union", "unique", "update", "user", "using",
    "variadic", "verbose", "when", "where", "window", "with",
];

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier grammar compiles"))
}

/// A schema name that passed [`validate`]. The only type allowed near SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for use in DDL/DML, e.g. `"tenant_a"`.
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }

    /// Schema-qualified, quoted table reference, e.g. `"tenant_a"."users"`.
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.quoted(), quote_ident(table))
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a tenant schema name.
pub fn validate(name: &str) -> Result<SchemaName> {
    let reject = |reason: &str| GatewayError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(reject("name is longer than 63 characters"));
    }
    if !grammar().is_match(name) {
        return Err(reject(
            "name must start with a lowercase letter and contain only lowercase letters, digits and underscores",
        ));
    }
    if RESERVED_WORDS.contains(&name) {
        return Err(reject("name is a reserved SQL word"));
    }
    if name == ADMIN_SCHEMA || name == "public" || name == "information_schema" {
        return Err(reject("name collides with a system or administrative schema"));
    }
    if name.starts_with("pg_") {
        return Err(reject("names starting with pg_ are reserved by PostgreSQL"));
    }

    Ok(SchemaName(name.to_string()))
}

/// Non-failing form of [`validate`].
pub fn is_valid(name: &str) -> bool {
    validate(name).is_ok()
}

/// Quote a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid("tenant_a"));
        assert!(is_valid("clinic_001"));
        assert!(is_valid("a"));
        assert!(is_valid(&"a".repeat(63)));
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(!is_valid(""));
        assert!(!is_valid(&"a".repeat(64)));
        assert!(!is_valid("1tenant"));
        assert!(!is_valid("_tenant"));
        assert!(!is_valid("Tenant_A"));
        assert!(!is_valid("tenant-a"));
        assert!(!is_valid("tenant.a"));
        assert!(!is_valid("ténant"));
    }

    #[test]
    fn test_rejects_injection_shapes() {
        let attempts = [
            "tenant a",
            "tenant\ta",
            "tenant_a;",
            "tenant_a; DROP SCHEMA public CASCADE",
            "tenant\"a",
            "tenant'a",
            "tenant`a",
            "a--",
            "a/*b*/",
            "tenant_a\n",
        ];
        for s in attempts {
            match validate(s) {
                Err(GatewayError::InvalidIdentifier { name, .. }) => assert_eq!(name, s),
                other => panic!("expected InvalidIdentifier for {:?}, got {:?}", s, other),
            }
        }
    }

    #[test]
    fn test_rejects_reserved_and_system_names() {
        assert!(!is_valid("select"));
        assert!(!is_valid("user"));
        assert!(!is_valid("table"));
        assert!(!is_valid(ADMIN_SCHEMA));
        assert!(!is_valid("public"));
        assert!(!is_valid("information_schema"));
        assert!(!is_valid("pg_catalog"));
        assert!(!is_valid("pg_temp_1"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");

        let name = validate("tenant_a").unwrap();
        assert_eq!(name.quoted(), "\"tenant_a\"");
        assert_eq!(name.qualify("users"), "\"tenant_a\".\"users\"");
        assert_eq!(name.to_string(), "tenant_a");
    }
}
