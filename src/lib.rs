//! Tenant Schema Gateway
//!
//! Provisions isolated tenant schemas inside one PostgreSQL database and
//! routes work to them through a per-schema connection pool cache.

pub mod activity;
pub mod api;
pub mod config;
pub mod error;
pub mod identifier;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod service;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::api::{
    create_schema, drop_schema, export_schema, get_schema, health_check, initialize_schema,
    list_schemas, migrate_schemas, AppState,
};

/// Build the HTTP router over a shared service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/schemas", get(list_schemas).post(create_schema))
        .route("/schemas/:name", get(get_schema).delete(drop_schema))
        .route("/schemas/:name/initialize", post(initialize_schema))
        .route("/schemas/:name/export", get(export_schema))
        .route("/migrate", post(migrate_schemas))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
