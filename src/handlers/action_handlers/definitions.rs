use axum::extract::{Json, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::actions::sync::HandlerDefinition;
use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DefinitionsQuery {
    #[serde(default)]
    pub encrypted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUpdatesQuery {
    #[serde(rename = "type")]
    pub handler_type: String,
    pub frontend_version: Option<String>,
}

/// GET /action-handlers/definitions[?encrypted=true] - client sync payload.
/// Served bare, not enveloped, since the runtime consumes it directly.
pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<DefinitionsQuery>,
) -> Result<Json<Vec<HandlerDefinition>>, ApiError> {
    let definitions = state.service.definitions(query.encrypted).await?;
    Ok(Json(definitions))
}

/// GET .../check-updates?type=&frontendVersion= - `{needsUpdate}`
pub async fn check_updates(
    State(state): State<AppState>,
    Query(query): Query<CheckUpdatesQuery>,
) -> Result<Json<Value>, ApiError> {
    let frontend_version = query.frontend_version.unwrap_or_default();
    let needs_update = state
        .service
        .check_for_updates(&query.handler_type, &frontend_version)
        .await?;
    Ok(Json(json!({ "needsUpdate": needs_update })))
}
