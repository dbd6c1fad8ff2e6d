use std::net::SocketAddr;
use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use webagent_kernel::llm::{AnthropicConfig, AnthropicLlmProvider};

async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn provider(addr: SocketAddr) -> AnthropicLlmProvider {
    AnthropicLlmProvider::new(AnthropicConfig {
        api_key: "test-anthropic-key".into(),
        model: "claude-test".into(),
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

fn message(content: Value) -> Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": content,
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 5}
    })
}

#[tokio::test]
async fn sends_messages_request_and_joins_text_blocks() {
    let router = Router::new().route(
        "/v1/messages",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            if header("x-api-key") != "test-anthropic-key"
                || header("anthropic-version") != "2023-06-01"
            {
                return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
            }
            assert_eq!(body["model"], "claude-test");
            assert_eq!(body["system"], "answer with json");
            assert_eq!(body["max_tokens"], 200);
            assert_eq!(body["messages"][0]["role"], "user");
            assert_eq!(body["messages"][0]["content"][0]["text"], "click the button");
            Json(message(json!([
                {"type": "text", "text": "{\"action\":\"scroll\","},
                {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                {"type": "text", "text": "\"direction\":\"down\"}"}
            ])))
            .into_response()
        }),
    );
    let addr = spawn_backend(router).await;

    let text = provider(addr).complete(&prompt()).await.unwrap();
    assert_eq!(text, "{\"action\":\"scroll\",\n\"direction\":\"down\"}");
}

#[tokio::test]
async fn statuses_map_to_llm_errors() {
    let router = Router::new().route(
        "/v1/messages",
        post(|Json(body): Json<Value>| async move {
            let envelope = |kind: &str, message: &str| {
                Json(json!({"type": "error", "error": {"type": kind, "message": message}}))
            };
            match body["model"].as_str().unwrap_or_default() {
                "limited" => (
                    StatusCode::TOO_MANY_REQUESTS,
                    envelope("rate_limit_error", "slow down"),
                ),
                "overloaded" => (
                    StatusCode::from_u16(529).unwrap(),
                    envelope("overloaded_error", "Overloaded"),
                ),
                _ => (
                    StatusCode::BAD_REQUEST,
                    envelope("invalid_request_error", "max_tokens too large"),
                ),
            }
        }),
    );
    let addr = spawn_backend(router).await;
    let with_model = |model: &str| {
        AnthropicLlmProvider::new(AnthropicConfig {
            api_key: "k".into(),
            model: model.into(),
            api_base: format!("http://{addr}/v1"),
            temperature: 0.3,
            max_tokens: 200,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    };

    let err = with_model("limited").complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited(ref msg) if msg.contains("slow down")));

    let err = with_model("overloaded").complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::Unavailable(ref msg) if msg.contains("Overloaded")));

    let err = with_model("bad").complete(&prompt()).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::Rejected {
            status: 400,
            message: "max_tokens too large".into()
        }
    );
}

#[tokio::test]
async fn no_text_blocks_is_an_empty_response() {
    let router = Router::new().route(
        "/v1/messages",
        post(|| async { Json(message(json!([{"type": "text", "text": "  "}]))) }),
    );
    let addr = spawn_backend(router).await;
    let err = provider(addr).complete(&prompt()).await.unwrap_err();
    assert_eq!(err, LlmError::EmptyResponse);
}

#[tokio::test]
async fn undecodable_envelope_is_invalid() {
    let router = Router::new().route("/v1/messages", post(|| async { "not json" }));
    let addr = spawn_backend(router).await;
    let err = provider(addr).complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(_)));
}
