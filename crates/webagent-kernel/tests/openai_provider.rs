use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use webagent_kernel::llm::{OpenAiConfig, OpenAiLlmProvider};

async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn provider(addr: SocketAddr, keys: &[&str]) -> OpenAiLlmProvider {
    OpenAiLlmProvider::new(OpenAiConfig {
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        model: "gpt-test".into(),
        api_base: format!("http://{addr}/v1/"),
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

fn completion(content: Value) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5}
    })
}

#[tokio::test]
async fn rotates_keys_on_rate_limit() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(body["response_format"]["type"], "json_object");
                assert_eq!(body["messages"][0]["role"], "system");
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer key-one" {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({"error": {"message": "quota"}})),
                    )
                        .into_response()
                } else {
                    Json(completion(json!(r#"{"action":"scroll","direction":"down"}"#)))
                        .into_response()
                }
            }
        }),
    );
    let addr = spawn_backend(router).await;

    let text = provider(addr, &["key-one", "key-two"])
        .complete(&prompt())
        .await
        .unwrap();
    assert!(text.contains("scroll"));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_keys_report_rate_limit() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "quota"}})),
            )
        }),
    );
    let addr = spawn_backend(router).await;
    let err = provider(addr, &["only-key"])
        .complete(&prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::RateLimited(ref msg) if msg.contains("quota")));
}

#[tokio::test]
async fn server_errors_are_unavailable_and_client_errors_rejected() {
    let router = Router::new()
        .route(
            "/v1/chat/completions",
            post(|headers: HeaderMap| async move {
                if headers.get("authorization").is_some_and(|v| v == "Bearer bad") {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"error": {"message": "invalid key"}})),
                    )
                } else {
                    (StatusCode::BAD_GATEWAY, Json(json!({})))
                }
            }),
        );
    let addr = spawn_backend(router).await;

    let err = provider(addr, &["good"]).complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::Unavailable(_)));

    let err = provider(addr, &["bad"]).complete(&prompt()).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::Rejected {
            status: 401,
            message: "invalid key".into()
        }
    );
}

#[tokio::test]
async fn blank_content_is_an_empty_response() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(completion(json!("   "))) }),
    );
    let addr = spawn_backend(router).await;
    let err = provider(addr, &["k"]).complete(&prompt()).await.unwrap_err();
    assert_eq!(err, LlmError::EmptyResponse);
}

#[tokio::test]
async fn undecodable_envelope_is_invalid() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { "definitely not json" }),
    );
    let addr = spawn_backend(router).await;
    let err = provider(addr, &["k"]).complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)));
}
