//! Request handlers.
//!
//! Each handler resolves the synthesized operation name from the route and
//! delegates to the catalog. The generic `/ops/{name}` endpoint exposes
//! the whole table; the entity/aspect routes are ergonomic wrappers over
//! the same operations.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use mc_core::{CorrelationId, Urn};
use mc_services::{OpDescriptor, OpRequest, OpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.catalog().pool().stats();
    Json(json!({
        "status": "ok",
        "sessions": { "max": stats.max_sessions, "available": stats.available },
    }))
}

/// GET /api/v1/ops
pub async fn list_ops(State(state): State<AppState>) -> Json<Vec<OpDescriptor>> {
    Json(state.catalog().ops().cloned().collect())
}

/// POST /api/v1/ops/{name}
pub async fn invoke_op(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<OpRequest>,
) -> ApiResult<Json<OpResponse>> {
    invoke(&state, &name, request).await
}

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub urn: Option<String>,
    #[serde(default)]
    pub cascade: bool,
}

/// PUT /api/v1/entities/{entity_type}
pub async fn upsert_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Json(request): Json<OpRequest>,
) -> ApiResult<Json<OpResponse>> {
    invoke(&state, &format!("upsert_{entity_type}"), request).await
}

/// GET /api/v1/entities/{entity_type}?urn=
pub async fn get_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<OpResponse>> {
    let request = OpRequest { urn: query.urn.map(Urn::from), ..OpRequest::default() };
    invoke(&state, &format!("get_{entity_type}"), request).await
}

/// DELETE /api/v1/entities/{entity_type}?urn=&cascade=
pub async fn delete_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<OpResponse>> {
    let request = OpRequest {
        urn: query.urn.map(Urn::from),
        cascade: query.cascade,
        ..OpRequest::default()
    };
    invoke(&state, &format!("delete_{entity_type}"), request).await
}

#[derive(Debug, Deserialize)]
pub struct AspectQuery {
    pub urn: Option<String>,
    pub version: Option<u64>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// POST /api/v1/entities/{entity_type}/aspects/{aspect}
pub async fn upsert_aspect(
    State(state): State<AppState>,
    Path((entity_type, aspect)): Path<(String, String)>,
    Json(request): Json<OpRequest>,
) -> ApiResult<Json<OpResponse>> {
    let request = OpRequest { entity_type: Some(entity_type), ..request };
    invoke(&state, &format!("upsert_{aspect}_aspect"), request).await
}

/// GET /api/v1/entities/{entity_type}/aspects/{aspect}?urn=&version=|from=&to=
pub async fn get_aspect(
    State(state): State<AppState>,
    Path((entity_type, aspect)): Path<(String, String)>,
    Query(query): Query<AspectQuery>,
) -> ApiResult<Json<OpResponse>> {
    let request = OpRequest {
        urn: query.urn.map(Urn::from),
        entity_type: Some(entity_type),
        version: query.version,
        from: query.from,
        to: query.to,
        ..OpRequest::default()
    };
    invoke(&state, &format!("get_{aspect}_aspect"), request).await
}

/// DELETE /api/v1/entities/{entity_type}/aspects/{aspect}?urn=
pub async fn delete_aspect(
    State(state): State<AppState>,
    Path((entity_type, aspect)): Path<(String, String)>,
    Query(query): Query<AspectQuery>,
) -> ApiResult<Json<OpResponse>> {
    let request = OpRequest {
        urn: query.urn.map(Urn::from),
        entity_type: Some(entity_type),
        ..OpRequest::default()
    };
    invoke(&state, &format!("delete_{aspect}_aspect"), request).await
}

async fn invoke(state: &AppState, name: &str, request: OpRequest) -> ApiResult<Json<OpResponse>> {
    let correlation_id = request.correlation_id.unwrap_or_else(CorrelationId::generate);
    let request = OpRequest { correlation_id: Some(correlation_id), ..request };
    state
        .catalog()
        .invoke(name, request)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, correlation_id))
}
