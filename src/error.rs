use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Schema already exists: {schema}")]
    AlreadyExists { schema: String },

    #[error("Unknown schema: {schema}")]
    UnknownSchema { schema: String },

    #[error("Unique constraint conflict in {schema} during {operation}: {cause}")]
    UniqueConstraintConflict {
        schema: String,
        operation: String,
        cause: String,
    },

    #[error("Timed out waiting for a connection to {schema}")]
    PoolTimeout { schema: String },

    #[error("Storage unavailable for {schema}: {cause}")]
    StorageUnavailable { schema: String, cause: String },

    #[error("Storage error in {schema} during {operation}: {cause}")]
    Storage {
        schema: String,
        operation: String,
        table: Option<String>,
        cause: String,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable kind, independent of the message text.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidIdentifier { .. } => "invalid_identifier",
            GatewayError::AlreadyExists { .. } => "already_exists",
            GatewayError::UnknownSchema { .. } => "unknown_schema",
            GatewayError::UniqueConstraintConflict { .. } => "unique_constraint_conflict",
            GatewayError::PoolTimeout { .. } => "pool_timeout",
            GatewayError::StorageUnavailable { .. } => "storage_unavailable",
            GatewayError::Storage { .. } => "storage_error",
            GatewayError::InvalidRequest { .. } => "invalid_request",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    pub fn unknown_schema(schema: impl Into<String>) -> Self {
        GatewayError::UnknownSchema {
            schema: schema.into(),
        }
    }

    /// Normalise a driver error raised while running `operation` against `schema`.
    pub fn storage(schema: &str, operation: &str, err: tokio_postgres::Error) -> Self {
        classify_pg_error(schema, operation, None, err)
    }

    /// Same as [`GatewayError::storage`] but tagged with the table being touched.
    pub fn storage_on_table(
        schema: &str,
        table: &str,
        operation: &str,
        err: tokio_postgres::Error,
    ) -> Self {
        classify_pg_error(schema, operation, Some(table), err)
    }

    /// Normalise a pool acquisition failure for `schema`.
    pub fn pool(schema: &str, err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;

        match err {
            PoolError::Timeout(_) => GatewayError::PoolTimeout {
                schema: schema.to_string(),
            },
            PoolError::Backend(e) => classify_pg_error(schema, "connect", None, e),
            PoolError::Closed => GatewayError::StorageUnavailable {
                schema: schema.to_string(),
                cause: "connection pool is closed".to_string(),
            },
            other => GatewayError::StorageUnavailable {
                schema: schema.to_string(),
                cause: other.to_string(),
            },
        }
    }

    /// True when the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::PoolTimeout { .. } | GatewayError::StorageUnavailable { .. }
        )
    }
}

fn classify_pg_error(
    schema: &str,
    operation: &str,
    table: Option<&str>,
    err: tokio_postgres::Error,
) -> GatewayError {
    let cause = db_message(&err);

    if let Some(code) = err.code() {
        if *code == SqlState::UNIQUE_VIOLATION {
            return GatewayError::UniqueConstraintConflict {
                schema: schema.to_string(),
                operation: operation.to_string(),
                cause,
            };
        }
        if *code == SqlState::DUPLICATE_SCHEMA {
            return GatewayError::AlreadyExists {
                schema: schema.to_string(),
            };
        }
        if *code == SqlState::INVALID_SCHEMA_NAME {
            return GatewayError::unknown_schema(schema);
        }
        // Class 08 is connection exceptions, 57P0x is server shutdown, 53300 too many connections
        let raw = code.code();
        if raw.starts_with("08") || raw.starts_with("57P0") || *code == SqlState::TOO_MANY_CONNECTIONS {
            return GatewayError::StorageUnavailable {
                schema: schema.to_string(),
                cause,
            };
        }
    } else if err.is_closed() || is_io_error(&err) {
        return GatewayError::StorageUnavailable {
            schema: schema.to_string(),
            cause,
        };
    }

    GatewayError::Storage {
        schema: schema.to_string(),
        operation: operation.to_string(),
        table: table.map(str::to_string),
        cause,
    }
}

fn is_io_error(err: &tokio_postgres::Error) -> bool {
    std::error::Error::source(err).map_or(false, |source| source.is::<std::io::Error>())
}

/// Prefer the server's message over the driver's wrapper text.
fn db_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidIdentifier { .. }
            | GatewayError::AlreadyExists { .. }
            | GatewayError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownSchema { .. } => StatusCode::NOT_FOUND,
            GatewayError::UniqueConstraintConflict { .. } => StatusCode::CONFLICT,
            GatewayError::PoolTimeout { .. } | GatewayError::StorageUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Storage { .. } | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn to_response_body(&self) -> ErrorResponse {
        let (message, schema, cause) = match self {
            GatewayError::InvalidIdentifier { name, reason } => (
                format!("'{}' is not a valid schema name", name),
                None,
                Some(reason.clone()),
            ),
            GatewayError::AlreadyExists { schema } => (
                format!("Schema '{}' already exists", schema),
                Some(schema.clone()),
                None,
            ),
            GatewayError::UnknownSchema { schema } => (
                format!("Schema '{}' does not exist", schema),
                Some(schema.clone()),
                None,
            ),
            GatewayError::UniqueConstraintConflict {
                schema,
                operation,
                cause,
            } => (
                format!("Duplicate unique key during {}", operation),
                Some(schema.clone()),
                Some(cause.clone()),
            ),
            GatewayError::PoolTimeout { schema } => (
                format!("Timed out waiting for a connection to '{}'", schema),
                Some(schema.clone()),
                None,
            ),
            GatewayError::StorageUnavailable { schema, cause } => (
                "Database is unavailable".to_string(),
                Some(schema.clone()),
                Some(cause.clone()),
            ),
            GatewayError::Storage {
                schema,
                operation,
                table,
                cause,
            } => (
                match table {
                    Some(t) => format!("{} failed on table '{}'", operation, t),
                    None => format!("{} failed", operation),
                },
                Some(schema.clone()),
                Some(cause.clone()),
            ),
            GatewayError::InvalidRequest { message } => (message.clone(), None, None),
            GatewayError::Internal(msg) => (msg.clone(), None, None),
        };

        ErrorResponse {
            error: self.kind().to_string(),
            message,
            schema,
            cause,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

impl From<tokio_postgres::Error> for GatewayError {
    fn from(err: tokio_postgres::Error) -> Self {
        classify_pg_error("(unknown)", "query", None, err)
    }
}

impl From<deadpool_postgres::PoolError> for GatewayError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        GatewayError::pool("(unknown)", err)
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let invalid = GatewayError::InvalidIdentifier {
            name: "a b".to_string(),
            reason: "whitespace".to_string(),
        };
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let exists = GatewayError::AlreadyExists {
            schema: "tenant_a".to_string(),
        };
        assert_eq!(exists.status_code(), StatusCode::BAD_REQUEST);

        assert_eq!(
            GatewayError::unknown_schema("tenant_a").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::PoolTimeout {
                schema: "tenant_a".to_string()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(GatewayError::unknown_schema("x").kind(), "unknown_schema");
        assert_eq!(
            GatewayError::PoolTimeout {
                schema: "x".to_string()
            }
            .kind(),
            "pool_timeout"
        );
        assert_eq!(
            GatewayError::InvalidRequest {
                message: "m".to_string()
            }
            .kind(),
            "invalid_request"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::PoolTimeout {
            schema: "x".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::unknown_schema("x").is_retryable());
    }

    #[test]
    fn test_response_body_carries_schema() {
        let body = GatewayError::unknown_schema("tenant_z").to_response_body();
        assert_eq!(body.error, "unknown_schema");
        assert_eq!(body.schema.as_deref(), Some("tenant_z"));
        assert!(body.cause.is_none());
    }
}
