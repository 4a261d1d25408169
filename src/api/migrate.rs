use crate::api::{actor_id, AppState};
use crate::error::Result;
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    pub source: String,
    pub target: String,
}

/// Copy row data between two existing schemas. Per-table failures and
/// conflicts are part of the response body, not an error status.
pub async fn migrate_schemas(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MigrateRequest>,
) -> Result<impl IntoResponse> {
    let started = Instant::now();
    let actor = actor_id(&headers);

    let result = state
        .service
        .migrate(actor.as_deref(), &request.source, &request.target)
        .await?;

    info!(
        "Migration {} -> {} finished in {}ms: {} copied, {} conflicts, success={}",
        result.source,
        result.target,
        started.elapsed().as_millis(),
        result.total_copied(),
        result.total_conflicts(),
        result.success
    );

    Ok(Json(result))
}
