pub mod rest;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use orgmind_engine::Engine;

pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Run control
        .route("/api/run", post(rest::api_start_run))
        .route("/api/run/stop", post(rest::api_stop_run))
        // Read side
        .route("/api/status", get(rest::api_status))
        .route("/api/people", get(rest::api_people))
        .route("/api/topics", get(rest::api_topics))
        .route("/api/conflicts", get(rest::api_conflicts))
        .route("/api/updates", get(rest::api_updates))
        .route("/api/snapshot", get(rest::api_snapshot))
        .route("/api/run-log", get(rest::api_run_log))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
