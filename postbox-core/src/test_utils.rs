//! Test utilities for postbox-core.
//!
//! [`ScriptedTransport`] replays pre-programmed run streams from memory, so
//! conversations can be tested without an agent backend.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! postbox-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use postbox_core::test_utils::{ScriptedRun, ScriptedTransport};
//! use postbox_core::Conversation;
//!
//! # async fn example() -> postbox_core::Result<()> {
//! let transport = ScriptedTransport::new().with_run(ScriptedRun::text_reply("m1", "Hello!"));
//! let mut conversation = Conversation::new(transport);
//!
//! conversation.send_message("Hi", |_| {}).await?;
//! assert_eq!(conversation.history()[1].content, "Hello!");
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{ByteStream, RunTransport};
use crate::types::{Role, RunAgentInput, ToolInvocation, ToolInvocationResult};

/// Encode one payload as an SSE frame.
pub fn sse_frame(payload: &Value) -> Vec<u8> {
    format!("data: {}\n\n", payload).into_bytes()
}

/// One pre-programmed run stream.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    open_error: Option<(u16, String)>,
    chunks: Vec<Vec<u8>>,
    delay: Option<Duration>,
    stream_error: Option<String>,
    hang: bool,
}

impl ScriptedRun {
    /// A run that streams each payload as its own chunk.
    pub fn frames(payloads: Vec<Value>) -> Self {
        Self {
            chunks: payloads.iter().map(sse_frame).collect(),
            ..Self::default()
        }
    }

    /// A run that streams the given raw chunks unchanged.
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// A run whose whole body arrives as one chunk.
    pub fn body(body: impl Into<String>) -> Self {
        Self::chunks(vec![body.into().into_bytes()])
    }

    /// A complete run answering with one assistant message.
    pub fn text_reply(message_id: &str, text: &str) -> Self {
        Self::frames(vec![
            json!({"type": "RUN_STARTED", "threadId": "thread", "runId": "run"}),
            json!({"type": "TEXT_MESSAGE_START", "messageId": message_id, "role": "assistant"}),
            json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": message_id, "delta": text}),
            json!({"type": "TEXT_MESSAGE_END", "messageId": message_id}),
            json!({"type": "RUN_FINISHED", "threadId": "thread", "runId": "run"}),
        ])
    }

    /// A run rejected by the server with `status` before any byte streams.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self {
            open_error: Some((status, body.into())),
            ..Self::default()
        }
    }

    /// Wait `delay` before each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the stream after the last chunk.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// Keep the stream open forever after the last chunk.
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Decrements the open stream count when a scripted stream is dropped.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory [`RunTransport`] that replays [`ScriptedRun`]s in order
/// and records every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    runs: Arc<Mutex<VecDeque<ScriptedRun>>>,
    tool_results: Arc<Mutex<HashMap<String, String>>>,
    requests: Arc<Mutex<Vec<RunAgentInput>>>,
    tool_requests: Arc<Mutex<Vec<ToolInvocation>>>,
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a run; runs are replayed in the order they were added.
    pub fn with_run(self, run: ScriptedRun) -> Self {
        self.runs.lock().push_back(run);
        self
    }

    /// Answer invocations of `tool_name` with `content`.
    pub fn with_tool_result(self, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        self.tool_results
            .lock()
            .insert(tool_name.into(), content.into());
        self
    }

    /// Every run request received so far.
    pub fn requests(&self) -> Vec<RunAgentInput> {
        self.requests.lock().clone()
    }

    /// Every tool invocation received so far.
    pub fn tool_requests(&self) -> Vec<ToolInvocation> {
        self.tool_requests.lock().clone()
    }

    /// Number of run streams handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunTransport for ScriptedTransport {
    async fn open(&self, input: &RunAgentInput) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(input.clone());

        let run = self.runs.lock().pop_front().ok_or_else(|| {
            TransportError::Connect("ScriptedTransport: no more runs configured".to_string())
        })?;

        if let Some((status, body)) = run.open_error {
            return Err(TransportError::Status { status, body });
        }

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let guard = StreamGuard(Arc::clone(&self.open_streams));

        let stream = async_stream::stream! {
            let _guard = guard;
            for chunk in run.chunks {
                if let Some(delay) = run.delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk);
            }
            if let Some(message) = run.stream_error {
                yield Err(TransportError::Stream(message));
                return;
            }
            if run.hang {
                futures::future::pending::<()>().await;
            }
        };

        Ok(stream.boxed())
    }

    async fn invoke_tool(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolInvocationResult, TransportError> {
        self.tool_requests.lock().push(invocation.clone());

        let content = self
            .tool_results
            .lock()
            .get(&invocation.tool_name)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                body: format!("unknown tool '{}'", invocation.tool_name),
            })?;

        Ok(ToolInvocationResult {
            message_id: uuid::Uuid::new_v4().to_string(),
            tool_call_id: invocation.tool_call_id.clone(),
            content,
            role: Role::Tool,
        })
    }
}
