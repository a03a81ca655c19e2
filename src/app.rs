use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::DatabaseManager;
use crate::handlers::action_handlers;
use crate::services::ActionHandlerService;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ActionHandlerService>,
    /// Present when the store is Postgres-backed; probed by `/health`
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(service: Arc<ActionHandlerService>, pool: Option<PgPool>) -> Self {
        Self { service, pool }
    }
}

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(action_handler_routes())
        .with_state(state);

    // Global middleware
    let router = if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

fn action_handler_routes() -> Router<AppState> {
    use axum::routing::{post, put};

    Router::new()
        // Collection
        .route(
            "/action-handlers",
            get(action_handlers::handlers_get).post(action_handlers::handlers_post),
        )
        .route("/action-handlers/latest", get(action_handlers::handlers_latest))
        .route("/action-handlers/initialize", post(action_handlers::handlers_initialize))
        // Client sync
        .route("/action-handlers/definitions", get(action_handlers::definitions_get))
        .route(
            "/action-handlers/definitions/check-updates",
            get(action_handlers::definitions_check_updates),
        )
        .route(
            "/action-handlers/check-updates",
            get(action_handlers::definitions_check_updates),
        )
        // Versions
        .route(
            "/action-handlers/:type/versions",
            post(action_handlers::record_versions_post),
        )
        .route(
            "/action-handlers/:type/:version",
            put(action_handlers::record_put).delete(action_handlers::record_delete),
        )
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Table Actions",
            "version": version,
            "description": "Versioned action-handler store and distribution API",
            "endpoints": {
                "home": "/",
                "health": "/health",
                "handlers": "/action-handlers[?type=], /action-handlers/latest?type=",
                "versions": "/action-handlers/:type/:version, /action-handlers/:type/versions?changeType=",
                "seed": "/action-handlers/initialize",
                "definitions": "/action-handlers/definitions[?encrypted=true]",
                "check_updates": "/action-handlers/definitions/check-updates?type=&frontendVersion=",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    let Some(pool) = state.pool.as_ref() else {
        return (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "memory" }
            })),
        );
    };

    match DatabaseManager::health_check(pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::database::MemoryHandlerRepository;
    use crate::versioning::CodeCipher;

    fn test_router() -> Router {
        let service = ActionHandlerService::new(
            Arc::new(MemoryHandlerRepository::default()),
            CodeCipher::new("router-test-key").unwrap(),
        );
        create_router(AppState::new(Arc::new(service), None), true)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_without_database_is_ok() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["database"], "memory");
    }

    #[tokio::test]
    async fn latest_requires_a_type() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/action-handlers/latest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn definitions_of_an_empty_store_is_a_bare_array() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/action-handlers/definitions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn deleting_an_unknown_version_is_not_found() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/action-handlers/view/9.9.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_change_type_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/action-handlers/view/versions?changeType=huge")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }
}
