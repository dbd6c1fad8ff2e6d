use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use webagent_kernel::llm::{GoogleConfig, GoogleLlmProvider};

async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn provider(addr: SocketAddr, model: &str) -> GoogleLlmProvider {
    GoogleLlmProvider::new(GoogleConfig {
        api_key: "test-google-key".into(),
        model: model.into(),
        api_base: format!("http://{addr}/v1beta"),
        temperature: 0.3,
        max_tokens: 200,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn prompt() -> Prompt {
    Prompt {
        system: "answer with json".into(),
        user: "click the button".into(),
    }
}

async fn generate(
    Path(target): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if query.get("key").map(String::as_str) != Some("test-google-key") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}})),
        );
    }
    match target.as_str() {
        "gemini-test:generateContent" => {
            assert_eq!(body["systemInstruction"]["parts"][0]["text"], "answer with json");
            assert_eq!(body["contents"][0]["role"], "user");
            assert_eq!(body["contents"][0]["parts"][0]["text"], "click the button");
            assert_eq!(body["generationConfig"]["maxOutputTokens"], 200);
            assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
            (
                StatusCode::OK,
                Json(json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [
                            {"text": "{\"action\":\"scroll\","},
                            {"text": "\"direction\":\"down\"}"}
                        ]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4}
                })),
            )
        }
        "gemini-blocked:generateContent" => (
            StatusCode::OK,
            Json(json!({"candidates": [{"finishReason": "SAFETY"}]})),
        ),
        "gemini-quota:generateContent" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}})),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}})),
        ),
    }
}

fn router() -> Router {
    Router::new().route("/v1beta/models/:target", post(generate))
}

#[tokio::test]
async fn generate_content_joins_candidate_parts() {
    let addr = spawn_backend(router()).await;
    let text = provider(addr, "gemini-test").complete(&prompt()).await.unwrap();
    assert_eq!(text, "{\"action\":\"scroll\",\"direction\":\"down\"}");
}

#[tokio::test]
async fn candidate_without_content_is_empty() {
    let addr = spawn_backend(router()).await;
    let err = provider(addr, "gemini-blocked")
        .complete(&prompt())
        .await
        .unwrap_err();
    assert_eq!(err, LlmError::EmptyResponse);
}

#[tokio::test]
async fn statuses_map_to_llm_errors() {
    let addr = spawn_backend(router()).await;

    let err = provider(addr, "gemini-quota")
        .complete(&prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::RateLimited(ref msg) if msg.contains("exhausted")));

    let err = provider(addr, "gemini-down")
        .complete(&prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Unavailable(ref msg) if msg.contains("overloaded")));

    let bad_key = GoogleLlmProvider::new(GoogleConfig {
        api_key: "wrong".into(),
        model: "gemini-test".into(),
        api_base: format!("http://{addr}/v1beta"),
        temperature: 0.3,
        max_tokens: 200,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let err = bad_key.complete(&prompt()).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::Rejected {
            status: 400,
            message: "API key not valid.".into()
        }
    );
}
