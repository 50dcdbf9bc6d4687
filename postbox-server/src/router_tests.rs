//! Tests for the router builder.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::error::BuildError;
use crate::router::MockAgentRouter;
use crate::script::ReplyScript;

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn sse_types(app: Router, uri: &str) -> Vec<String> {
    let response = app
        .oneshot(post_json(
            uri,
            r#"{"threadId":"t-1","messages":[{"id":"m-1","role":"user","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes)
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .filter_map(|v| v["type"].as_str().map(String::from))
        .collect()
}

#[tokio::test]
async fn test_agent_route_streams_events() {
    let app = MockAgentRouter::new()
        .reply_script(ReplyScript::fixed(["Hello"]))
        .build()
        .unwrap();

    let types = sse_types(app, "/agent").await;

    assert_eq!(
        types,
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED"
        ]
    );
}

#[tokio::test]
async fn test_agent_route_rejects_malformed_body() {
    let app = MockAgentRouter::new().build().unwrap();

    let response = app
        .oneshot(post_json("/agent", "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_tool_route_uses_registered_responder() {
    let app = MockAgentRouter::new()
        .tool("searchEmail", |args| {
            Ok(json!({"query": args["query"].clone(), "results": 2}))
        })
        .build()
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/tool/searchEmail",
            r#"{"toolCallId":"tc-9","args":{"query":"invoice"}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["toolCallId"], "tc-9");
    assert_eq!(body["role"], "tool");
    let content: Value = serde_json::from_str(body["content"].as_str().unwrap()).unwrap();
    assert_eq!(content, json!({"query": "invoice", "results": 2}));
}

#[tokio::test]
async fn test_tool_route_requires_tool_call_id() {
    let app = MockAgentRouter::new().build().unwrap();

    let response = app
        .oneshot(post_json("/tool/searchEmail", r#"{"args":{}}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_build_rejects_invalid_tool_names() {
    let err = MockAgentRouter::new()
        .tool("", |_| Ok(Value::Null))
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidToolName(ref n) if n.is_empty()));

    let err = MockAgentRouter::new()
        .tool("mail/send", |_| Ok(Value::Null))
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidToolName(ref n) if n == "mail/send"));
}

#[tokio::test]
async fn test_cors_enabled_by_default() {
    let app = MockAgentRouter::new().build().unwrap();

    let mut request = post_json("/tool/anything", r#"{"toolCallId":"tc-1"}"#);
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_without_cors_omits_headers() {
    let app = MockAgentRouter::new().without_cors().build().unwrap();

    let mut request = post_json("/tool/anything", r#"{"toolCallId":"tc-1"}"#);
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_build_nested_serves_under_prefix() {
    let app = MockAgentRouter::new().build_nested("/mock").unwrap();

    let types = sse_types(app.clone(), "/mock/agent").await;
    assert_eq!(types.first().map(String::as_str), Some("RUN_STARTED"));

    let response = app
        .oneshot(post_json("/agent", r#"{"messages":[]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
