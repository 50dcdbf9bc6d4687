//! Conversation session
//!
//! A [`Conversation`] owns everything that outlives a single run: the message
//! history, the thread id, the tool registry and the shared state. Each call
//! to [`Conversation::run`] opens one stream through its [`RunTransport`],
//! decodes and dispatches every frame, folds finished messages and tool
//! results into the history and reports each normalized [`RunEvent`] to the
//! caller's callback in arrival order.
//!
//! # Example
//!
//! ```rust,no_run
//! use postbox_core::{Conversation, HttpTransport, RunEvent};
//!
//! # async fn example() -> postbox_core::Result<()> {
//! let mut conversation = Conversation::new(HttpTransport::from_env()?);
//!
//! let outcome = conversation
//!     .send_message("Any unread mail from Dana?", |event| {
//!         if let RunEvent::TextMessageContent { delta, .. } = event {
//!             print!("{}", delta);
//!         }
//!     })
//!     .await?;
//!
//! println!("\n{} new message(s)", outcome.new_messages.len());
//! # Ok(())
//! # }
//! ```

use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::decoder::{DecodedFrame, FrameDecoder};
use crate::dispatcher::EventDispatcher;
use crate::error::{DispatchError, PostboxError, ProtocolError, Result};
use crate::events::RunEvent;
use crate::transport::{HttpTransport, RunTransport};
use crate::types::{
    ContextItem, Message, Role, RunAgentInput, RunSession, ToolCall, ToolDefinition,
    ToolInvocation,
};

// ============================================================================
// Run parameters and outcome
// ============================================================================

/// Per-run options for [`Conversation::run`]
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub context: Vec<ContextItem>,
    pub forwarded_props: Value,
    pub cancellation: Option<CancellationToken>,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            context: Vec::new(),
            forwarded_props: Value::Object(Map::new()),
            cancellation: None,
        }
    }
}

impl RunParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one context entry
    pub fn context(mut self, description: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push(ContextItem {
            description: description.into(),
            value: value.into(),
        });
        self
    }

    /// Set the opaque props forwarded to the agent
    pub fn forwarded_props(mut self, props: Value) -> Self {
        self.forwarded_props = props;
        self
    }

    /// Make the run cancellable through `token`
    ///
    /// Cancelling stops event delivery promptly and resolves the run with
    /// [`RunStatus::Cancelled`].
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The server sent `RUN_FINISHED`
    Finished,
    /// The caller cancelled the run
    Cancelled,
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub thread_id: String,
    pub run_id: String,
    /// Optional payload of `RUN_FINISHED`
    pub result: Option<Value>,
    /// Messages appended to the history during this run, in history order.
    /// Already part of the history; do not append them again.
    pub new_messages: Vec<Message>,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// A chat with an AG-UI agent
pub struct Conversation<T: RunTransport = HttpTransport> {
    transport: T,
    session: RunSession,
    history: Vec<Message>,
    tools: Vec<ToolDefinition>,
    server_messages: Vec<Message>,
}

impl<T: RunTransport> std::fmt::Debug for Conversation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("thread_id", &self.session.thread_id)
            .field("run_id", &self.session.run_id)
            .field("messages", &self.history.len())
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl Conversation<HttpTransport> {
    /// Create a conversation over HTTP, configured from the environment
    pub fn from_env() -> Result<Self> {
        let transport =
            HttpTransport::from_env().map_err(|e| PostboxError::Configuration(e.to_string()))?;
        Ok(Self::new(transport))
    }
}

impl<T: RunTransport> Conversation<T> {
    /// Create a conversation with a fresh thread id and empty state
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: RunSession::new(),
            history: Vec::new(),
            tools: Vec::new(),
            server_messages: Vec::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn thread_id(&self) -> &str {
        &self.session.thread_id
    }

    /// Id of the current or most recent run
    pub fn run_id(&self) -> Option<&str> {
        self.session.run_id.as_deref()
    }

    pub fn state(&self) -> &Value {
        &self.session.state
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// The last `MESSAGES_SNAPSHOT` the server sent in this thread
    pub fn server_messages(&self) -> &[Message] {
        &self.server_messages
    }

    /// Append a message to the history as-is
    pub fn add_message(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Register a tool; it is sent with every later run
    pub fn add_tool(&mut self, tool: ToolDefinition) {
        self.tools.push(tool);
    }

    /// Merge `updates` into the shared state, replacing top-level keys
    pub fn set_state(&mut self, updates: Map<String, Value>) {
        match &mut self.session.state {
            Value::Object(state) => state.extend(updates),
            other => *other = Value::Object(updates),
        }
    }

    /// Forget the conversation and start a new thread
    ///
    /// Tools stay registered.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.server_messages.clear();
        self.session = RunSession::new();
        log::debug!("history cleared, new thread {}", self.session.thread_id);
    }

    /// Append a user message and run
    pub async fn send_message<F>(
        &mut self,
        content: impl Into<String>,
        on_event: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(&RunEvent),
    {
        self.add_message(Message::user(content));
        self.run(RunParameters::default(), on_event).await
    }

    /// Execute a tool on the backend and append its result to the history
    pub async fn invoke_tool(
        &mut self,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        args: Value,
    ) -> Result<Message> {
        let invocation = ToolInvocation {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            args,
        };

        let result = self.transport.invoke_tool(&invocation).await?;

        let message = Message {
            role: result.role,
            ..Message::tool_result(result.message_id, result.tool_call_id, result.content)
        };
        self.history.push(message.clone());
        Ok(message)
    }

    /// Run the agent over the current history
    ///
    /// Every normalized event is passed to `on_event` before the next frame
    /// is processed. Resolves once: `Ok` on `RUN_FINISHED` or cancellation,
    /// `Err` on a transport failure, `RUN_ERROR`, a stream that ends without
    /// a terminal event, or a protocol violation seen during the run.
    pub async fn run<F>(&mut self, params: RunParameters, mut on_event: F) -> Result<RunOutcome>
    where
        F: FnMut(&RunEvent),
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.session.run_id = Some(run_id.clone());

        let input = RunAgentInput {
            thread_id: Some(self.session.thread_id.clone()),
            run_id: Some(run_id),
            messages: self.history.clone(),
            tools: self.tools.clone(),
            context: params.context,
            forwarded_props: params.forwarded_props,
            state: self.session.state.clone(),
        };

        let cancel = params.cancellation.unwrap_or_default();
        let mut run = ActiveRun {
            start: self.history.len(),
            ..ActiveRun::default()
        };

        log::debug!(
            "starting run {} on thread {} with {} message(s)",
            self.run_id().unwrap_or_default(),
            self.session.thread_id,
            input.messages.len()
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.transport.open(&input) => Some(opened),
        };
        let mut stream = match opened {
            Some(opened) => opened?,
            None => return Ok(self.cancelled(&mut run)),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let Some(next) = next else {
                return Ok(self.cancelled(&mut run));
            };

            let (frames, closed) = match next {
                Some(Ok(chunk)) => (run.decoder.push(&chunk), false),
                Some(Err(e)) => {
                    log::debug!("run stream failed: {}", e);
                    run.dispatcher.discard_open();
                    return Err(e.into());
                }
                None => (run.decoder.finish(), true),
            };
            let ended = closed || run.decoder.is_terminated();

            for frame in frames {
                if cancel.is_cancelled() {
                    return Ok(self.cancelled(&mut run));
                }
                self.handle_frame(&mut run, frame, &mut on_event);
                if run.terminal.is_some() {
                    return self.settle(run);
                }
            }

            if cancel.is_cancelled() {
                return Ok(self.cancelled(&mut run));
            }
            if ended {
                return self.settle(run);
            }
        }
    }

    fn handle_frame<F>(&mut self, run: &mut ActiveRun, frame: DecodedFrame, on_event: &mut F)
    where
        F: FnMut(&RunEvent),
    {
        let dispatched = frame
            .map_err(DispatchError::from)
            .and_then(|payload| run.dispatcher.dispatch(&mut self.session, payload));

        match dispatched {
            Ok(Some(event)) => {
                self.fold(run, &event);
                on_event(&event);
            }
            Ok(None) => {}
            Err(DispatchError::Decode(e)) => {
                log::warn!("skipping undecodable frame: {}", e);
                on_event(&RunEvent::DecodeFailed {
                    error: e.to_string(),
                });
            }
            Err(DispatchError::Protocol(e)) => {
                log::warn!("dropping event: {}", e);
                on_event(&RunEvent::ProtocolViolation {
                    error: e.to_string(),
                });
                run.protocol_error.get_or_insert(e);
            }
        }
    }

    /// Apply a dispatched event to the history.
    fn fold(&mut self, run: &mut ActiveRun, event: &RunEvent) {
        match event {
            RunEvent::TextMessageEnd {
                message_id,
                role,
                content,
            } => {
                // A tool call may have created this message before it ended.
                let placeholder = self.position_in_run(run, message_id);

                match placeholder {
                    Some(index) => {
                        self.history[index].role = *role;
                        self.history[index].content = content.clone();
                    }
                    None => {
                        self.history
                            .push(Message::with_id(message_id.clone(), *role, content.clone()));
                    }
                }
                if *role == Role::Assistant {
                    run.last_assistant = Some(message_id.clone());
                }
            }

            RunEvent::ToolCallEnd {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                args,
            } => {
                let parent_id = parent_message_id
                    .clone()
                    .or_else(|| run.last_assistant.clone())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

                let call = ToolCall {
                    id: tool_call_id.clone(),
                    name: tool_call_name.clone(),
                    arguments: args.clone(),
                };

                match self.position_in_run(run, &parent_id) {
                    Some(index) => self.history[index].tool_calls.push(call),
                    None => {
                        let mut parent = Message::with_id(parent_id.clone(), Role::Assistant, "");
                        parent.tool_calls.push(call);
                        self.history.push(parent);
                    }
                }
                run.last_assistant = Some(parent_id);
            }

            RunEvent::ToolCallResult {
                message_id,
                tool_call_id,
                content,
                role,
            } => {
                let message = Message {
                    role: *role,
                    ..Message::tool_result(message_id.clone(), tool_call_id.clone(), content.clone())
                };
                self.history.push(message);
            }

            RunEvent::MessagesSnapshot { messages } => {
                self.server_messages = messages.clone();
            }

            RunEvent::RunFinished {
                thread_id, result, ..
            } => {
                if thread_id != &self.session.thread_id {
                    log::debug!(
                        "server finished run on thread {} (client thread {})",
                        thread_id,
                        self.session.thread_id
                    );
                }
                run.terminal = Some(Terminal::Finished {
                    result: result.clone(),
                });
            }

            RunEvent::RunError { message, code } => {
                run.terminal = Some(Terminal::Failed {
                    message: message.clone(),
                    code: code.clone(),
                });
            }

            _ => {}
        }
    }

    /// Resolve a run whose stream produced a terminal event or ended.
    fn settle(&mut self, mut run: ActiveRun) -> Result<RunOutcome> {
        let dropped = run.dispatcher.discard_open();

        match run.terminal.take() {
            Some(Terminal::Failed { message, code }) => {
                log::debug!("run failed: {}", message);
                Err(PostboxError::Run { message, code })
            }
            None => {
                log::debug!(
                    "run stream closed without a terminal event ({} open buffer(s) dropped)",
                    dropped
                );
                Err(PostboxError::AbnormalTermination)
            }
            Some(Terminal::Finished { result }) => match run.protocol_error.take() {
                Some(e) => Err(e.into()),
                None => {
                    log::debug!("run finished");
                    Ok(self.outcome(RunStatus::Finished, result, &run))
                }
            },
        }
    }

    /// Index of the message `id` among those this run appended.
    ///
    /// Ids are only unique within a run; a server may reuse one later.
    fn position_in_run(&self, run: &ActiveRun, id: &str) -> Option<usize> {
        self.history[run.start..]
            .iter()
            .position(|m| m.id == id)
            .map(|offset| run.start + offset)
    }

    fn cancelled(&mut self, run: &mut ActiveRun) -> RunOutcome {
        let dropped = run.dispatcher.discard_open();
        log::debug!("run cancelled ({} open buffer(s) dropped)", dropped);
        self.outcome(RunStatus::Cancelled, None, run)
    }

    fn outcome(&self, status: RunStatus, result: Option<Value>, run: &ActiveRun) -> RunOutcome {
        RunOutcome {
            status,
            thread_id: self.session.thread_id.clone(),
            run_id: self.session.run_id.clone().unwrap_or_default(),
            result,
            new_messages: self.history[run.start..].to_vec(),
        }
    }
}

// ============================================================================
// Run bookkeeping
// ============================================================================

enum Terminal {
    Finished {
        result: Option<Value>,
    },
    Failed {
        message: String,
        code: Option<String>,
    },
}

#[derive(Default)]
struct ActiveRun {
    decoder: FrameDecoder,
    dispatcher: EventDispatcher,
    /// History length when the run started; everything after it was
    /// appended by this run.
    start: usize,
    /// Most recent assistant message of this run, for parentless tool calls.
    last_assistant: Option<String>,
    protocol_error: Option<ProtocolError>,
    terminal: Option<Terminal>,
}
