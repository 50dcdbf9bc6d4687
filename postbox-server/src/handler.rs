//! HTTP handlers for the mock AG-UI endpoints.

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use postbox_core::{AguiEvent, MessageRole, RunAgentInput, ToolInvocation, ToolInvocationResult};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Handle `POST /agent`.
///
/// Streams one scripted assistant reply framed by `RUN_STARTED` and
/// `RUN_FINISHED`. The request's thread and run ids are echoed; missing ones
/// are generated.
pub async fn agent_handler(
    State(state): State<AppState>,
    payload: Result<Json<RunAgentInput>, JsonRejection>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(input) = payload?;

    let thread_id = input
        .thread_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let run_id = input
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let chunks = state.script.chunks(&input);
    let delay = state.script.delay();

    log::debug!(
        "run {} on thread {}: {} message(s), {} chunk(s)",
        run_id,
        thread_id,
        input.messages.len(),
        chunks.len()
    );

    let (tx, rx) = mpsc::channel::<AguiEvent>(100);

    tokio::spawn(async move {
        let message_id = uuid::Uuid::new_v4().to_string();

        let mut events = vec![
            AguiEvent::RunStarted {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
            },
            AguiEvent::TextMessageStart {
                message_id: message_id.clone(),
                role: MessageRole::Assistant,
            },
        ];
        for chunk in chunks {
            events.push(AguiEvent::TextMessageContent {
                message_id: message_id.clone(),
                delta: chunk,
            });
        }
        events.push(AguiEvent::TextMessageEnd {
            message_id: message_id.clone(),
        });
        events.push(AguiEvent::RunFinished {
            thread_id,
            run_id,
            result: None,
        });

        for event in events {
            if matches!(event, AguiEvent::TextMessageContent { .. }) && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // The client went away; stop producing.
            if tx.send(event).await.is_err() {
                log::debug!("client disconnected, abandoning run");
                return;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|e| {
            json!({
                "type": "RUN_ERROR",
                "message": format!("Failed to serialize event: {}", e)
            })
            .to_string()
        });
        Ok::<_, Infallible>(Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Handle `POST /tool/:tool_name`.
///
/// Unregistered tools answer with a generic acknowledgement.
pub async fn tool_handler(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    payload: Result<Json<ToolInvocation>, JsonRejection>,
) -> ServerResult<Json<ToolInvocationResult>> {
    let Json(mut invocation) = payload?;
    invocation.tool_name = tool_name;

    log::debug!(
        "tool {} called for {} with {}",
        invocation.tool_name,
        invocation.tool_call_id,
        invocation.args
    );

    let content = match state.tools.get(&invocation.tool_name) {
        Some(responder) => responder(&invocation.args).map_err(ServerError::Internal)?,
        None => json!({ "message": format!("tool {} executed", invocation.tool_name) }),
    };

    Ok(Json(ToolInvocationResult {
        message_id: uuid::Uuid::new_v4().to_string(),
        tool_call_id: invocation.tool_call_id,
        content: content.to_string(),
        role: MessageRole::Tool,
    }))
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
