use crate::api::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    catalog_reachable: bool,
    registered_schemas: Option<usize>,
    cached_pools: usize,
    connection_budget: ConnectionBudget,
    uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct ConnectionBudget {
    reserved: u32,
    limit: u32,
    per_schema: u32,
}

/// Liveness plus a snapshot of the pool cache. Answers 503 when the catalog
/// cannot be read.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pool_manager = state.service.pool_manager();
    let config = pool_manager.config();

    let registered_schemas = state.service.list_schemas().await.map(|s| s.len()).ok();
    let catalog_reachable = registered_schemas.is_some();

    let (code, status) = if catalog_reachable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            catalog_reachable,
            registered_schemas,
            cached_pools: pool_manager.active_pools(),
            connection_budget: ConnectionBudget {
                reserved: pool_manager.total_connections(),
                limit: config.max_total_connections,
                per_schema: config.max_connections_per_schema,
            },
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    )
}
