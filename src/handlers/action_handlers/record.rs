use axum::extract::{Json, Path, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::models::{ActionHandlerPatch, ActionHandlerRecord};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::versioning::ChangeKind;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionQuery {
    pub change_type: Option<String>,
}

/// PUT /action-handlers/:type/:version - patch one exact version
pub async fn put(
    State(state): State<AppState>,
    Path((handler_type, version)): Path<(String, String)>,
    Json(patch): Json<ActionHandlerPatch>,
) -> ApiResult<ActionHandlerRecord> {
    state
        .service
        .update(&handler_type, &version, patch)
        .await?
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("handler {} v{}", handler_type, version)))
}

/// POST /action-handlers/:type/versions?changeType=major|minor|patch
pub async fn versions_post(
    State(state): State<AppState>,
    Path(handler_type): Path<String>,
    Query(query): Query<VersionQuery>,
    body: Option<Json<ActionHandlerPatch>>,
) -> ApiResult<ActionHandlerRecord> {
    let change = match query.change_type.as_deref() {
        Some(raw) => raw.parse::<ChangeKind>().map_err(ApiError::validation_error)?,
        None => ChangeKind::default(),
    };
    let patch = body.map(|Json(p)| p).unwrap_or_default();

    let record = state
        .service
        .create_new_version(&handler_type, patch, change)
        .await?;
    Ok(ApiResponse::created(record))
}

/// DELETE /action-handlers/:type/:version - remove one exact version
pub async fn delete(
    State(state): State<AppState>,
    Path((handler_type, version)): Path<(String, String)>,
) -> ApiResult<Value> {
    if !state.service.remove(&handler_type, &version).await? {
        return Err(ApiError::not_found(format!("handler {} v{}", handler_type, version)));
    }
    Ok(ApiResponse::success(json!({ "type": handler_type, "version": version, "deleted": true })))
}
