use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use webagent_core_types::TaskId;

use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route("/tasks/:task_id", get(get_task_handler))
        .route("/tasks/:task_id/abort", post(abort_task_handler))
}

#[derive(Debug, Default, Deserialize)]
struct AbortRequest {
    #[serde(default)]
    reason: Option<String>,
}

fn task_error(status: StatusCode, kind: &str, task_id: &str, detail: String) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "kind": kind,
                "detail": detail,
                "retryable": false,
                "task_id": task_id,
            }
        })),
    )
        .into_response()
}

#[instrument(name = "webagent.tasks.get", skip(state))]
async fn get_task_handler(State(state): State<ServeState>, Path(task_id): Path<String>) -> Response {
    let id = match TaskId::parse(task_id.clone()) {
        Ok(id) => id,
        Err(err) => {
            return task_error(StatusCode::BAD_REQUEST, "invalid_request", &task_id, err.to_string())
        }
    };
    match state.orchestrator.session(&id).await {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => task_error(
            StatusCode::NOT_FOUND,
            "not_found",
            &task_id,
            format!("no session for task {task_id}"),
        ),
    }
}

#[instrument(name = "webagent.tasks.abort", skip(state, body))]
async fn abort_task_handler(
    State(state): State<ServeState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Response {
    let id = match TaskId::parse(task_id.clone()) {
        Ok(id) => id,
        Err(err) => {
            return task_error(StatusCode::BAD_REQUEST, "invalid_request", &task_id, err.to_string())
        }
    };
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AbortRequest::default()
    } else {
        match serde_json::from_slice::<AbortRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return task_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    &task_id,
                    format!("invalid abort body: {err}"),
                )
            }
        }
    };
    let session = state.orchestrator.abort(&id, request.reason).await;
    (StatusCode::OK, Json(session)).into_response()
}
