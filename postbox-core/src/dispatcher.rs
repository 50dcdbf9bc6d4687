//! Event dispatch.
//!
//! [`EventDispatcher`] turns decoded JSON payloads into [`RunEvent`]s. It owns
//! the buffers of every message and tool call that is still streaming, keyed
//! by id so that any number of them can be open at once, and it applies
//! state snapshots and deltas to the [`RunSession`] it is handed.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{DecodeError, DispatchError, ProtocolError};
use crate::events::{AguiEvent, JsonPatchOp, MessageRole, RunEvent};
use crate::partial_json::parse_partial;
use crate::types::RunSession;

#[derive(Debug)]
struct MessageBuffer {
    role: MessageRole,
    content: String,
}

#[derive(Debug)]
struct ToolCallBuffer {
    name: String,
    args: String,
    parent_message_id: Option<String>,
}

/// Per-run event state machine.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    messages: HashMap<String, MessageBuffer>,
    tool_calls: HashMap<String, ToolCallBuffer>,
    run_active: bool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// True between `RUN_STARTED` and a terminal event.
    pub fn is_run_active(&self) -> bool {
        self.run_active
    }

    /// Number of messages and tool calls still streaming.
    pub fn open_buffers(&self) -> usize {
        self.messages.len() + self.tool_calls.len()
    }

    /// Drop every open buffer and return how many there were.
    pub fn discard_open(&mut self) -> usize {
        let dropped = self.open_buffers();
        if dropped > 0 {
            log::debug!("discarding {} open buffer(s)", dropped);
        }
        self.messages.clear();
        self.tool_calls.clear();
        self.run_active = false;
        dropped
    }

    /// Dispatch one decoded payload.
    ///
    /// Returns `Ok(None)` for event kinds this client does not know. On a
    /// protocol error the event is dropped and the buffer it refers to, if
    /// any, is discarded; other buffers are untouched.
    pub fn dispatch(
        &mut self,
        session: &mut RunSession,
        payload: Value,
    ) -> Result<Option<RunEvent>, DispatchError> {
        let event = parse_event(payload)?;
        log::trace!("dispatching {}", event.kind());

        let normalized = match event {
            AguiEvent::RunStarted { thread_id, run_id } => {
                self.run_active = true;
                session.run_id = Some(run_id.clone());
                RunEvent::RunStarted { thread_id, run_id }
            }

            AguiEvent::RunFinished {
                thread_id,
                run_id,
                result,
            } => {
                self.run_active = false;
                RunEvent::RunFinished {
                    thread_id,
                    run_id,
                    result,
                }
            }

            AguiEvent::RunError { message, code } => {
                self.run_active = false;
                RunEvent::RunError { message, code }
            }

            AguiEvent::TextMessageStart { message_id, role } => {
                if self.messages.contains_key(&message_id) {
                    self.messages.remove(&message_id);
                    return Err(ProtocolError::DuplicateMessage(message_id).into());
                }
                self.messages.insert(
                    message_id.clone(),
                    MessageBuffer {
                        role,
                        content: String::new(),
                    },
                );
                RunEvent::TextMessageStart { message_id, role }
            }

            AguiEvent::TextMessageContent { message_id, delta } => {
                let buffer = self.messages.get_mut(&message_id).ok_or_else(|| {
                    ProtocolError::UnknownMessage {
                        event: "TEXT_MESSAGE_CONTENT".to_string(),
                        message_id: message_id.clone(),
                    }
                })?;
                buffer.content.push_str(&delta);
                RunEvent::TextMessageContent {
                    buffer: buffer.content.clone(),
                    message_id,
                    delta,
                }
            }

            AguiEvent::TextMessageEnd { message_id } => {
                let buffer = self.messages.remove(&message_id).ok_or_else(|| {
                    ProtocolError::UnknownMessage {
                        event: "TEXT_MESSAGE_END".to_string(),
                        message_id: message_id.clone(),
                    }
                })?;
                RunEvent::TextMessageEnd {
                    message_id,
                    role: buffer.role,
                    content: buffer.content,
                }
            }

            AguiEvent::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
            } => {
                if self.tool_calls.contains_key(&tool_call_id) {
                    self.tool_calls.remove(&tool_call_id);
                    return Err(ProtocolError::DuplicateToolCall(tool_call_id).into());
                }
                self.tool_calls.insert(
                    tool_call_id.clone(),
                    ToolCallBuffer {
                        name: tool_call_name.clone(),
                        args: String::new(),
                        parent_message_id: parent_message_id.clone(),
                    },
                );
                RunEvent::ToolCallStart {
                    tool_call_id,
                    tool_call_name,
                    parent_message_id,
                }
            }

            AguiEvent::ToolCallArgs {
                tool_call_id,
                delta,
            } => {
                let buffer = self.tool_calls.get_mut(&tool_call_id).ok_or_else(|| {
                    ProtocolError::UnknownToolCall {
                        event: "TOOL_CALL_ARGS".to_string(),
                        tool_call_id: tool_call_id.clone(),
                    }
                })?;
                buffer.args.push_str(&delta);
                RunEvent::ToolCallArgs {
                    partial_args: parse_partial(&buffer.args),
                    buffer: buffer.args.clone(),
                    tool_call_name: buffer.name.clone(),
                    tool_call_id,
                    delta,
                }
            }

            AguiEvent::ToolCallEnd { tool_call_id } => {
                let buffer = self.tool_calls.remove(&tool_call_id).ok_or_else(|| {
                    ProtocolError::UnknownToolCall {
                        event: "TOOL_CALL_END".to_string(),
                        tool_call_id: tool_call_id.clone(),
                    }
                })?;
                let args = parse_arguments(&buffer.args).map_err(|e| {
                    ProtocolError::InvalidToolArguments {
                        tool_call_id: tool_call_id.clone(),
                        tool_call_name: buffer.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                RunEvent::ToolCallEnd {
                    tool_call_id,
                    tool_call_name: buffer.name,
                    parent_message_id: buffer.parent_message_id,
                    args,
                }
            }

            AguiEvent::ToolCallResult {
                message_id,
                tool_call_id,
                content,
                role,
            } => {
                if self.tool_calls.remove(&tool_call_id).is_some() {
                    return Err(ProtocolError::ResultBeforeEnd(tool_call_id).into());
                }
                RunEvent::ToolCallResult {
                    message_id,
                    tool_call_id,
                    content,
                    role: role.unwrap_or(MessageRole::Tool),
                }
            }

            AguiEvent::StateSnapshot { snapshot } => {
                session.state = snapshot.clone();
                RunEvent::StateSnapshot { snapshot }
            }

            AguiEvent::StateDelta { delta } => {
                session.state = apply_delta(&session.state, &delta)?;
                RunEvent::StateDelta { delta }
            }

            AguiEvent::MessagesSnapshot { messages } => RunEvent::MessagesSnapshot { messages },

            AguiEvent::Unknown => return Ok(None),
        };

        Ok(Some(normalized))
    }
}

/// Deserialize a payload, telling a malformed known event apart from JSON
/// that is not an event at all.
fn parse_event(payload: Value) -> Result<AguiEvent, DecodeError> {
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);

    serde_json::from_value(payload).map_err(|e| DecodeError::InvalidEvent {
        kind: kind.unwrap_or_else(|| "<untyped>".to_string()),
        reason: e.to_string(),
    })
}

/// Strict parse of a finished argument buffer; nothing streamed means `{}`.
fn parse_arguments(buffer: &str) -> Result<Value, serde_json::Error> {
    if buffer.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(buffer)
}

/// Apply a JSON Patch to a copy of `state`; the original is left untouched
/// on failure.
fn apply_delta(state: &Value, delta: &[JsonPatchOp]) -> Result<Value, ProtocolError> {
    let ops = serde_json::to_value(delta)
        .and_then(serde_json::from_value::<json_patch::Patch>)
        .map_err(|e| ProtocolError::InvalidStateDelta(e.to_string()))?;

    let mut next = state.clone();
    json_patch::patch(&mut next, &ops)
        .map_err(|e| ProtocolError::InvalidStateDelta(e.to_string()))?;
    Ok(next)
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
