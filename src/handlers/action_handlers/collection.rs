use axum::extract::{Json, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::models::{ActionHandlerRecord, NewActionHandler};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct TypeQuery {
    #[serde(rename = "type")]
    pub handler_type: Option<String>,
}

/// GET /action-handlers[?type=] - every stored version, optionally of one type
pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<TypeQuery>,
) -> ApiResult<Vec<ActionHandlerRecord>> {
    let records = state.service.find_all(query.handler_type.as_deref()).await?;
    Ok(ApiResponse::success(records))
}

/// GET /action-handlers/latest?type= - highest semver of a type
pub async fn latest(
    State(state): State<AppState>,
    Query(query): Query<TypeQuery>,
) -> ApiResult<ActionHandlerRecord> {
    let handler_type = query
        .handler_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter 'type' is required"))?;

    state
        .service
        .find_latest_by_type(&handler_type)
        .await?
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("no handler of type '{}'", handler_type)))
}

/// POST /action-handlers - create one (type, version) row
pub async fn post(
    State(state): State<AppState>,
    Json(body): Json<NewActionHandler>,
) -> ApiResult<ActionHandlerRecord> {
    let record = state.service.create(body).await?;
    Ok(ApiResponse::created(record))
}

/// POST /action-handlers/initialize - seed the default handlers into an empty store
pub async fn initialize(State(state): State<AppState>) -> ApiResult<Value> {
    let created = state.service.seed_defaults().await?;
    Ok(ApiResponse::success(json!({ "created": created })))
}
