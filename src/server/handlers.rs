use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::logs::{LogError, ZIP_FILE_NAME};
use crate::server::state::AppState;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Effective configuration of this unit
pub async fn config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

/// Last `lines` lines of the node log, or all of it when `lines <= 0`
pub async fn logs(State(state): State<AppState>, Path(lines): Path<i64>) -> Response {
    let manager = state.logs.clone();
    let result = tokio::task::spawn_blocking(move || manager.get_all_logs(lines)).await;

    match result {
        Ok(Ok(content)) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Ok(Err(e)) => log_error_response(e),
        Err(e) => internal_error(e.to_string()),
    }
}

/// The node log bundled as a zip archive
pub async fn logs_zip(State(state): State<AppState>) -> Response {
    let manager = state.logs.clone();
    let result = tokio::task::spawn_blocking(move || {
        let path = manager.export_zip()?;
        Ok::<_, LogError>(std::fs::read(path)?)
    })
    .await;

    match result {
        Ok(Ok(bytes)) => (
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", ZIP_FILE_NAME),
                ),
            ],
            Body::from(bytes),
        )
            .into_response(),
        Ok(Err(e)) => log_error_response(e),
        Err(e) => internal_error(e.to_string()),
    }
}

fn log_error_response(e: LogError) -> Response {
    match e {
        LogError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
        other => internal_error(other.to_string()),
    }
}

fn internal_error(message: String) -> Response {
    error!("Log endpoint failed: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

/// Create the Axum router. Logging routes are only mounted when the
/// configuration asks for them.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/config", get(config));

    if state.logging_endpoints_enabled() {
        router = router
            .route("/logs/zip", get(logs_zip))
            .route("/logs/{lines}", get(logs));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
