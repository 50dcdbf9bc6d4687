//! Conversation data model and run request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crate::events::MessageRole as Role;

// ============================================================================
// Messages
// ============================================================================

/// A message in the conversation history.
///
/// `timestamp` is local bookkeeping and never goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing, default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), role, content)
    }

    /// Create a message with a known id.
    pub fn with_id(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_id(id, Role::Tool, content)
        }
    }
}

/// A finished tool call attached to its parent assistant message.
///
/// On the wire this is the OpenAI-style
/// `{"id", "type": "function", "function": {"name", "arguments"}}` shape
/// with the arguments encoded as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireToolCall", try_from = "WireToolCall")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id,
            call_type: function_type(),
            function: WireFunction {
                name: call.name,
                arguments: call.arguments.to_string(),
            },
        }
    }
}

impl TryFrom<WireToolCall> for ToolCall {
    type Error = serde_json::Error;

    fn try_from(wire: WireToolCall) -> Result<Self, Self::Error> {
        let arguments = if wire.function.arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&wire.function.arguments)?
        };
        Ok(Self {
            id: wire.id,
            name: wire.function.name,
            arguments,
        })
    }
}

// ============================================================================
// Tools
// ============================================================================

/// A tool the agent may call, registered before a run and sent verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Body of `POST /tool/:toolName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    #[serde(skip)]
    pub tool_name: String,
    pub tool_call_id: String,
    #[serde(default)]
    pub args: Value,
}

/// Response of `POST /tool/:toolName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationResult {
    pub message_id: String,
    pub tool_call_id: String,
    pub content: String,
    #[serde(default = "Role::tool")]
    pub role: Role,
}

// ============================================================================
// Runs
// ============================================================================

/// Per-conversation run bookkeeping shared with the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSession {
    /// Stable for the whole conversation.
    pub thread_id: String,
    /// Id of the current or most recent run.
    pub run_id: Option<String>,
    /// Shared state, always a JSON object at the top level after a reset.
    pub state: Value,
}

impl RunSession {
    pub fn new() -> Self {
        Self {
            thread_id: uuid::Uuid::new_v4().to_string(),
            run_id: None,
            state: Value::Object(Map::new()),
        }
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the run request's `context` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub description: String,
    pub value: String,
}

/// Request body of `POST /agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub context: Vec<ContextItem>,
    #[serde(default)]
    pub forwarded_props: Value,
    #[serde(default)]
    pub state: Value,
}

impl RunAgentInput {
    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}
