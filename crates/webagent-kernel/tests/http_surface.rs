use std::sync::Arc;

use agent_core::{AgentConfig, LlmError, ScriptedLlmProvider, ScriptedReply};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use webagent_kernel::{build_router, ServeState, StepOrchestrator};

const PAGE: &str = r#"<html><body><a href="/pricing" id="pricing">Pricing</a></body></html>"#;

fn router(replies: Vec<ScriptedReply>) -> Router {
    let provider = Arc::new(ScriptedLlmProvider::new(replies));
    let config = AgentConfig::default()
        .retries(0)
        .llm_timeout(1_000)
        .step_timeout(5_000);
    let orchestrator = Arc::new(StepOrchestrator::new(config, provider));
    build_router(ServeState::new(orchestrator))
}

fn pricing_address() -> String {
    AgentConfig::default().reducer().reduce(PAGE, 300).elements[0]
        .address
        .clone()
}

fn act_body(step_index: u32) -> Value {
    json!({
        "task_id": "http-task",
        "prompt": "open the pricing page",
        "start_url": "https://shop.test/",
        "snapshot_html": PAGE,
        "step_index": step_index,
        "web_project_id": "shop",
        "history": []
    })
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn act_returns_action_with_selector() {
    let address = pricing_address();
    let router = router(vec![ScriptedReply::text(format!(
        r#"{{"action":"click","address":"{address}"}}"#
    ))]);

    let (status, body) = send(&router, "POST", "/act", Some(act_body(0))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"]["action"], "click");
    assert_eq!(body["action"]["address"], address.as_str());
    assert_eq!(body["selector"]["type"], "xpathSelector");
    assert_eq!(body["selector"]["value"], "//*[@id='pricing']");
    assert_eq!(body["task_id"], "http-task");
    assert_eq!(body["step_index"], 0);
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn out_of_order_maps_to_conflict() {
    let router = router(vec![]);
    let (status, body) = send(&router, "POST", "/act", Some(act_body(3))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "out_of_order_step");
    assert_eq!(body["error"]["expected_step_index"], 0);
    assert_eq!(body["error"]["step_index"], 3);
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn decision_errors_map_to_distinct_statuses() {
    let router = router(vec![
        ScriptedReply::Error(LlmError::RateLimited("slow down".into())),
        ScriptedReply::text("I would click pricing"),
    ]);

    let (status, body) = send(&router, "POST", "/act", Some(act_body(0))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], "backend_unavailable");

    let (status, body) = send(&router, "POST", "/act", Some(act_body(0))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "unparseable");
    assert_eq!(body["error"]["retryable"], false);

    let (status, body) = send(&router, "POST", "/act", Some(act_body(1))).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["kind"], "session_closed");

    let (status, session) = send(&router, "GET", "/tasks/http-task", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "failed");
    assert_eq!(session["expected_step_index"], 1);
    assert_eq!(session["history"].as_array().map(Vec::len), Some(1));
    assert_eq!(session["history"][0]["error"]["kind"], "unparseable");
}

#[tokio::test]
async fn blank_task_id_is_a_bad_request() {
    let router = router(vec![]);
    let mut body = act_body(0);
    body["task_id"] = json!("  ");
    let (status, body) = send(&router, "POST", "/act", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_request");
}

#[tokio::test]
async fn malformed_body_is_rejected_by_the_extractor() {
    let router = router(vec![]);
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/act")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"task_id": "t", "step_index": -1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn abort_then_inspect() {
    let router = router(vec![]);

    let (status, _) = send(&router, "GET", "/tasks/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &router,
        "POST",
        "/tasks/ghost/abort",
        Some(json!({"reason": "harness gave up"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["abort_reason"], "harness gave up");

    let (status, body) = send(&router, "GET", "/tasks/ghost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "aborted");

    let mut act = act_body(0);
    act["task_id"] = json!("ghost");
    let (status, body) = send(&router, "POST", "/act", Some(act)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["kind"], "session_closed");
}

#[tokio::test]
async fn abort_without_body_uses_default_reason() {
    let router = router(vec![]);
    let (status, body) = send(&router, "POST", "/tasks/quiet/abort", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abort_reason"], "aborted by caller");
}

#[tokio::test]
async fn health_and_metrics_endpoints() {
    let router = router(vec![]);
    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("webagent_"));
}
