use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use agent_core::DecisionError;
use serde_json::json;
use tracing::{info, instrument};

use crate::orchestrator::{StepError, StepRequest};
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/act", post(act_handler))
}

#[instrument(
    name = "webagent.act",
    skip(state, req),
    fields(task_id = %req.task_id, step_index = req.step_index)
)]
async fn act_handler(State(state): State<ServeState>, Json(req): Json<StepRequest>) -> Response {
    info!(
        url = %req.start_url,
        html_bytes = req.snapshot_html.len(),
        history_len = req.history.len(),
        "act request"
    );
    match state.orchestrator.step(req).await {
        Ok(outcome) => {
            info!(
                action = outcome.action.kind(),
                status = %outcome.status,
                "act response"
            );
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

impl StepError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::OutOfOrderStep { .. } => StatusCode::CONFLICT,
            Self::SessionClosed { .. } => StatusCode::GONE,
            Self::Decision {
                source: DecisionError::Unparseable { .. },
                ..
            } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Decision {
                source: DecisionError::BackendUnavailable { .. },
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Self::StepTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StepError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "kind": self.kind(),
            "detail": self.to_string(),
            "retryable": self.retryable(),
            "task_id": self.task_id(),
            "step_index": self.step_index(),
        });
        if let Some(expected) = self.expected_step_index() {
            error["expected_step_index"] = json!(expected);
        }
        (self.status_code(), Json(json!({ "error": error }))).into_response()
    }
}
