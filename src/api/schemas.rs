use crate::api::{actor_id, AppState};
use crate::error::Result;
use crate::registry::SchemaRecord;
use crate::schema::InitResult;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateSchemaRequest {
    pub name: String,
    /// Also create the managed tables (default: true)
    #[serde(default = "default_true")]
    pub initialize: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct CreateSchemaResponse {
    status: String,
    schema: SchemaRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables: Option<InitResult>,
}

#[derive(Serialize)]
pub struct ListSchemasResponse {
    schemas: Vec<SchemaRecord>,
    count: usize,
}

pub async fn list_schemas(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let schemas = state.service.list_schemas().await?;
    let count = schemas.len();
    Ok(Json(ListSchemasResponse { schemas, count }))
}

pub async fn create_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSchemaRequest>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers);

    let (schema, tables) = if request.initialize {
        let (record, init) = state
            .service
            .provision(actor.as_deref(), &request.name)
            .await?;
        (record, Some(init))
    } else {
        let record = state
            .service
            .create_schema(actor.as_deref(), &request.name)
            .await?;
        (record, None)
    };

    info!("Provisioned schema {} (tables initialized: {})", schema.name, tables.is_some());

    Ok((
        StatusCode::CREATED,
        Json(CreateSchemaResponse {
            status: "created".to_string(),
            schema,
            tables,
        }),
    ))
}

pub async fn get_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state.service.get_schema(&name).await?;
    Ok(Json(record))
}

pub async fn drop_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers);
    state.service.drop_schema(actor.as_deref(), &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn initialize_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers);
    let result = state.service.initialize(actor.as_deref(), &name).await?;
    Ok(Json(result))
}

pub async fn export_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers);
    let snapshot = state.service.export(actor.as_deref(), &name).await?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_to_initialize() {
        let request: CreateSchemaRequest = serde_json::from_str(r#"{"name":"tenant_a"}"#).unwrap();
        assert_eq!(request.name, "tenant_a");
        assert!(request.initialize);

        let request: CreateSchemaRequest =
            serde_json::from_str(r#"{"name":"tenant_a","initialize":false}"#).unwrap();
        assert!(!request.initialize);
    }
}
