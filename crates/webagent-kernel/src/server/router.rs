use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::metrics;

mod act;
mod tasks;

use super::state::ServeState;

/// Every route the service exposes.
pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(act::router())
        .merge(tasks::router())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let health = state.health.snapshot();
    let reducer = perceiver_structural::metrics::snapshot();
    Json(json!({
        "status": "healthy",
        "live": health.live,
        "ready": health.ready,
        "started_at": health.started_at,
        "last_error": health.last_error,
        "sessions": state.orchestrator.session_count(),
        "reducer": {
            "reductions": reducer.reduce.total,
            "degenerate": reducer.degenerate,
            "avg_ms": reducer.reduce.avg_ms,
        },
    }))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => {
            error!(?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
