//! # Postbox
//!
//! Streaming AG-UI client core for the postbox email assistant.
//!
//! A [`Conversation`] sends the chat history to an agent backend, receives
//! the run as a Server-Sent-Events stream and reassembles the typed frames
//! into chat messages and tool calls. The UI layer sees one callback of
//! normalized [`RunEvent`]s and one typed result per run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use postbox_core::{Conversation, RunEvent, ToolDefinition};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> postbox_core::Result<()> {
//!     // Talks to $POSTBOX_API_URL, or http://localhost:8000
//!     let mut conversation = Conversation::from_env()?;
//!
//!     conversation.add_tool(ToolDefinition::new(
//!         "searchEmail",
//!         "Search the mailbox",
//!         json!({"type": "object", "properties": {"query": {"type": "string"}}}),
//!     ));
//!
//!     conversation
//!         .send_message("Find the March invoices", |event| match event {
//!             RunEvent::TextMessageContent { delta, .. } => print!("{}", delta),
//!             RunEvent::ToolCallEnd { tool_call_name, args, .. } => {
//!                 println!("\n[{} {}]", tool_call_name, args)
//!             }
//!             _ => {}
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! - [`decoder`] - bytes to JSON payloads, independent of chunk boundaries
//! - [`dispatcher`] - payloads to [`RunEvent`]s, with per-id buffers
//! - [`session`] - history, tools, shared state and the run loop
//! - [`transport`] - the [`RunTransport`] seam and its HTTP implementation
//!
//! ## Feature Flags
//!
//! - `test-utils` - [`test_utils::ScriptedTransport`] for tests without a backend

pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod partial_json;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use decoder::{DecodedFrame, FrameDecoder, DONE_SENTINEL};
pub use dispatcher::EventDispatcher;
pub use error::{
    DecodeError, DispatchError, PostboxError, ProtocolError, Result, TransportError,
    ABNORMAL_TERMINATION_CODE,
};
pub use events::{AguiEvent, JsonPatchOp, MessageRole, RunEvent};
pub use partial_json::parse_partial;
pub use session::{Conversation, RunOutcome, RunParameters, RunStatus};
pub use transport::{ByteStream, HttpTransport, HttpTransportBuilder, RunTransport};
pub use types::{
    ContextItem, Message, Role, RunAgentInput, RunSession, ToolCall, ToolDefinition,
    ToolInvocation, ToolInvocationResult,
};

// Re-exported so callers can cancel runs without depending on tokio-util
pub use tokio_util::sync::CancellationToken;
