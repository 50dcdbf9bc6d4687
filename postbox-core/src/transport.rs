//! Run transport.
//!
//! [`RunTransport`] is the seam between a [`Conversation`](crate::Conversation)
//! and the agent backend: one streaming request per run plus synchronous
//! tool invocations. [`HttpTransport`] is the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::error::TransportError;
use crate::types::{RunAgentInput, ToolInvocation, ToolInvocationResult};

/// Default agent backend, matching the mock server's default port.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Environment variable read by [`HttpTransport::from_env`].
pub const API_URL_ENV: &str = "POSTBOX_API_URL";

/// Default timeout for establishing a connection
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a whole tool invocation
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw response body of a run, chunk by chunk.
///
/// The stream ends when the body ends. An `Err` item is a mid-stream failure
/// and is always the last item.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Transport to an AG-UI agent backend
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Start a run and return its event stream body.
    async fn open(&self, input: &RunAgentInput) -> Result<ByteStream, TransportError>;

    /// Execute a tool on the backend outside of a run.
    async fn invoke_tool(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolInvocationResult, TransportError>;
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP transport posting to `{api_base}/agent` and `{api_base}/tool/{name}`
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    headers: HeaderMap,
    tool_timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_base", &self.api_base)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for the given base URL
    pub fn new(api_base: impl Into<String>) -> Result<Self, TransportError> {
        Self::builder().api_base(api_base).build()
    }

    /// Create a transport from the `POSTBOX_API_URL` environment variable,
    /// falling back to `http://localhost:8000`
    pub fn from_env() -> Result<Self, TransportError> {
        let api_base = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(api_base)
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    /// The base URL requests are sent to
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }
}

#[async_trait]
impl RunTransport for HttpTransport {
    async fn open(&self, input: &RunAgentInput) -> Result<ByteStream, TransportError> {
        let url = self.url("agent");
        log::debug!("opening run stream at {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .json(input)
            .send()
            .await
            .map_err(TransportError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Stream(e.to_string()))
        });

        Ok(stream.boxed())
    }

    async fn invoke_tool(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolInvocationResult, TransportError> {
        let url = self.url(&format!("tool/{}", invocation.tool_name));
        log::debug!("invoking tool {} at {}", invocation.tool_name, url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .timeout(self.tool_timeout)
            .json(invocation)
            .send()
            .await
            .map_err(TransportError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ToolInvocationResult>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

/// Builder for [`HttpTransport`]
///
/// Every setting has a default; [`Self::build()`] only fails on an invalid
/// header or if the HTTP client cannot be created.
pub struct HttpTransportBuilder {
    api_base: Option<String>,
    headers: Vec<(String, String)>,
    connect_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    fn new() -> Self {
        Self {
            api_base: None,
            headers: Vec::new(),
            connect_timeout: None,
            tool_timeout: None,
        }
    }

    /// Set the backend base URL (default `http://localhost:8000`)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Add a header sent with every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the timeout for tool invocations
    ///
    /// Run streams have no overall timeout; cancel them instead.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let api_base = self
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(TransportError::Configuration(format!(
                "API base must be an http(s) URL, got '{}'",
                api_base
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::Configuration(format!("Invalid header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(&value).map_err(|e| {
                TransportError::Configuration(format!("Invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                TransportError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(HttpTransport {
            client,
            api_base,
            headers,
            tool_timeout: self.tool_timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT),
        })
    }
}


#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use crate::types::{Message, Role};
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> RunAgentInput {
        RunAgentInput {
            thread_id: Some("thread-1".to_string()),
            run_id: Some("run-1".to_string()),
            messages: vec![Message::with_id("u1", Role::User, "hello")],
            tools: vec![],
            context: vec![],
            forwarded_props: json!({}),
            state: json!({}),
        }
    }

    #[tokio::test]
    async fn test_open_streams_body() {
        let mock_server = MockServer::start().await;
        let body = "data: {\"type\":\"RUN_STARTED\",\"threadId\":\"thread-1\",\"runId\":\"run-1\"}\n\n";

        Mock::given(method("POST"))
            .and(path("/agent"))
            .and(header("accept", "text/event-stream"))
            .and(body_partial_json(json!({"threadId": "thread-1", "runId": "run-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri()).unwrap();
        let stream = transport.open(&input()).await.unwrap();
        let chunks: Vec<Vec<u8>> = stream.try_collect().await.unwrap();

        assert_eq!(chunks.concat(), body.as_bytes());
    }

    #[tokio::test]
    async fn test_open_sends_custom_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/agent"))
            .and(header("x-mailbox", "work"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::builder()
            .api_base(mock_server.uri())
            .header("x-mailbox", "work")
            .build()
            .unwrap();

        let stream = transport.open(&input()).await.unwrap();
        let chunks: Vec<Vec<u8>> = stream.try_collect().await.unwrap();
        assert!(chunks.concat().is_empty());
    }

    #[tokio::test]
    async fn test_open_non_success_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/agent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("agent unavailable"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri()).unwrap();
        let err = transport.open(&input()).await.err().unwrap();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "agent unavailable");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_connection_refused() {
        // Bind then drop a listener so the port is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(format!("http://{}", addr)).unwrap();
        let err = transport.open(&input()).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_invoke_tool() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tool/searchEmail"))
            .and(body_partial_json(json!({
                "toolCallId": "tc-1",
                "args": {"query": "invoices"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messageId": "m-tool",
                "toolCallId": "tc-1",
                "content": "{\"results\":[]}",
                "role": "tool"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri()).unwrap();
        let result = transport
            .invoke_tool(&ToolInvocation {
                tool_name: "searchEmail".to_string(),
                tool_call_id: "tc-1".to_string(),
                args: json!({"query": "invoices"}),
            })
            .await
            .unwrap();

        assert_eq!(result.message_id, "m-tool");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.content, "{\"results\":[]}");
    }

    #[tokio::test]
    async fn test_invoke_tool_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tool/x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri()).unwrap();
        let err = transport
            .invoke_tool(&ToolInvocation {
                tool_name: "x".to_string(),
                tool_call_id: "tc-1".to_string(),
                args: json!({}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }
}
