//! Tests for error handling and IntoResponse implementation.

use crate::error::*;
use axum::{http::StatusCode, response::IntoResponse};

#[test]
fn test_server_error_invalid_request_variant() {
    let error = ServerError::InvalidRequest("Bad input".to_string());

    let response = error.into_response();
    let (parts, _body) = response.into_parts();

    assert_eq!(parts.status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_server_error_internal_variant() {
    let error = ServerError::Internal("Something went wrong".to_string());

    let response = error.into_response();
    let (parts, _body) = response.into_parts();

    assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_server_error_body_is_json() {
    let response = ServerError::InvalidRequest("missing toolCallId".to_string()).into_response();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["error"], "missing toolCallId");
    assert_eq!(body["code"], 400);
}

#[test]
fn test_server_error_display() {
    let cases = [
        (
            ServerError::InvalidRequest("bad".to_string()),
            "Invalid request: bad",
        ),
        (
            ServerError::Internal("oops".to_string()),
            "Internal error: oops",
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.to_string(), expected);
    }
}

#[test]
fn test_build_error_display() {
    let error = BuildError::InvalidToolName("a/b".to_string());
    assert_eq!(
        error.to_string(),
        "Invalid tool name 'a/b': must be non-empty and must not contain '/'"
    );
}
