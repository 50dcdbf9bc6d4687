//! AG-UI protocol event types.
//!
//! [`AguiEvent`] is the wire form of every frame the agent backend streams.
//! [`RunEvent`] is the normalized form handed to the UI callback after the
//! dispatcher has folded deltas into their buffers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Message;

/// AG-UI protocol events.
///
/// Events are serialized with a `type` field in SCREAMING_SNAKE_CASE and
/// camelCase field names, as AG-UI puts them on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AguiEvent {
    // ===== Lifecycle Events =====
    /// Agent run started.
    RunStarted {
        /// Thread ID for conversation continuity.
        thread_id: String,
        /// Unique run ID for this execution.
        run_id: String,
    },

    /// Agent run finished successfully.
    RunFinished {
        /// Thread ID for conversation continuity.
        thread_id: String,
        /// Unique run ID for this execution.
        run_id: String,
        /// Optional result payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    /// Agent run failed with an error.
    RunError {
        /// Error message describing the failure.
        message: String,
        /// Optional error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    // ===== Text Message Events =====
    /// Start of a new text message.
    TextMessageStart {
        /// Unique message ID.
        message_id: String,
        /// Role of the message author.
        #[serde(default = "MessageRole::assistant")]
        role: MessageRole,
    },

    /// Incremental content for a text message.
    TextMessageContent {
        /// Message ID this content belongs to.
        message_id: String,
        /// Text delta to append.
        delta: String,
    },

    /// End of a text message.
    TextMessageEnd {
        /// Message ID that is complete.
        message_id: String,
    },

    // ===== Tool Call Events =====
    /// Start of a tool call.
    ToolCallStart {
        /// Unique tool call ID.
        tool_call_id: String,
        /// Name of the tool being called.
        tool_call_name: String,
        /// Optional parent message ID.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },

    /// Incremental arguments for a tool call.
    ToolCallArgs {
        /// Tool call ID this belongs to.
        tool_call_id: String,
        /// JSON argument delta.
        delta: String,
    },

    /// End of tool call arguments.
    ToolCallEnd {
        /// Tool call ID that is complete.
        tool_call_id: String,
    },

    /// Result from a tool call.
    ToolCallResult {
        /// Unique message ID for this result.
        message_id: String,
        /// Tool call ID this result is for.
        tool_call_id: String,
        /// Result content (text or JSON string).
        content: String,
        /// Role (typically Tool).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<MessageRole>,
    },

    // ===== State Management Events =====
    /// Complete state snapshot.
    StateSnapshot {
        /// The complete state object.
        snapshot: Value,
    },

    /// Incremental state update (JSON Patch).
    StateDelta {
        /// JSON Patch operations (RFC 6902).
        delta: Vec<JsonPatchOp>,
    },

    /// The server's view of the whole conversation.
    MessagesSnapshot {
        /// Every message the server knows about, in order.
        messages: Vec<Message>,
    },

    /// Any event kind this client does not know. Ignored by the dispatcher.
    #[serde(other)]
    Unknown,
}

impl AguiEvent {
    /// The wire name of this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AguiEvent::RunStarted { .. } => "RUN_STARTED",
            AguiEvent::RunFinished { .. } => "RUN_FINISHED",
            AguiEvent::RunError { .. } => "RUN_ERROR",
            AguiEvent::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            AguiEvent::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            AguiEvent::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            AguiEvent::ToolCallStart { .. } => "TOOL_CALL_START",
            AguiEvent::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            AguiEvent::ToolCallEnd { .. } => "TOOL_CALL_END",
            AguiEvent::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            AguiEvent::StateSnapshot { .. } => "STATE_SNAPSHOT",
            AguiEvent::StateDelta { .. } => "STATE_DELTA",
            AguiEvent::MessagesSnapshot { .. } => "MESSAGES_SNAPSHOT",
            AguiEvent::Unknown => "UNKNOWN",
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message.
    User,
    /// Assistant message.
    Assistant,
    /// System message.
    System,
    /// Tool result message.
    Tool,
}

impl MessageRole {
    pub(crate) fn assistant() -> Self {
        MessageRole::Assistant
    }

    pub(crate) fn tool() -> Self {
        MessageRole::Tool
    }
}

/// JSON Patch operation (RFC 6902).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatchOp {
    /// Operation type (add, remove, replace, move, copy, test).
    pub op: String,
    /// JSON Pointer path.
    pub path: String,
    /// Value for add/replace/test operations. An explicit `null` is
    /// `Some(Value::Null)`; only an absent field is `None`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    /// Source pointer for move/copy operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Normalized events reported to the caller of a run.
///
/// Each variant corresponds to one dispatched wire event, with the
/// accumulated buffers already folded in. Two extra variants report
/// per-frame problems that do not abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The server acknowledged the run.
    RunStarted { thread_id: String, run_id: String },

    /// A message started streaming.
    TextMessageStart {
        message_id: String,
        role: MessageRole,
    },

    /// A text delta arrived; `buffer` is everything received so far.
    TextMessageContent {
        message_id: String,
        delta: String,
        buffer: String,
    },

    /// A message finished; `content` is the final accumulated text.
    TextMessageEnd {
        message_id: String,
        role: MessageRole,
        content: String,
    },

    /// A tool call started streaming its arguments.
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        parent_message_id: Option<String>,
    },

    /// An argument delta arrived.
    ///
    /// `partial_args` is a best-effort parse of the incomplete buffer and is
    /// `None` whenever the buffer cannot be repaired into JSON.
    ToolCallArgs {
        tool_call_id: String,
        delta: String,
        buffer: String,
        tool_call_name: String,
        partial_args: Option<Value>,
    },

    /// A tool call finished; `args` is the strict parse of the whole buffer.
    ToolCallEnd {
        tool_call_id: String,
        tool_call_name: String,
        parent_message_id: Option<String>,
        args: Value,
    },

    /// A tool produced a result.
    ToolCallResult {
        message_id: String,
        tool_call_id: String,
        content: String,
        role: MessageRole,
    },

    /// The run completed.
    RunFinished {
        thread_id: String,
        run_id: String,
        result: Option<Value>,
    },

    /// The server reported a run failure.
    RunError {
        message: String,
        code: Option<String>,
    },

    /// Shared state was replaced.
    StateSnapshot { snapshot: Value },

    /// Shared state was patched.
    StateDelta { delta: Vec<JsonPatchOp> },

    /// The server's message view was replaced.
    MessagesSnapshot { messages: Vec<Message> },

    /// One frame could not be decoded. The run continues.
    DecodeFailed { error: String },

    /// One event broke the stream's ordering rules and was dropped.
    ProtocolViolation { error: String },
}

impl RunEvent {
    /// Returns true for `RunFinished` and `RunError`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunFinished { .. } | RunEvent::RunError { .. })
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
