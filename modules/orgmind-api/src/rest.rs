use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, info};

use orgmind_common::EngineError;

use crate::AppState;

// --- Run control ---

/// 202 on a fresh start, 200 with the unchanged status while a run is active,
/// 503 when the record source cannot be read.
pub async fn api_start_run(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.start_run().await {
        Ok(status) => (StatusCode::ACCEPTED, Json(status)).into_response(),
        Err(EngineError::AlreadyRunning(status)) => (StatusCode::OK, Json(*status)).into_response(),
        Err(e @ EngineError::SourceUnavailable(_)) => {
            error!(error = %e, "Start request failed");
            let status = state.engine.status().await;
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string(), "status": status })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Start request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn api_stop_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.engine.stop_run().await;
    info!(phase = %status.phase, "Stop requested");
    Json(status)
}

// --- Queries ---

pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

pub async fn api_people(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.people().await)
}

pub async fn api_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.topics().await)
}

pub async fn api_conflicts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.conflicts().await)
}

pub async fn api_updates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.updates().await)
}

/// Latest batch snapshot, or `null` before the first batch lands.
pub async fn api_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.latest_snapshot().await)
}

pub async fn api_run_log(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.run_log().await)
}
