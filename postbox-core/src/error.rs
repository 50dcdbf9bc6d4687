//! Error types for postbox
//!
//! Each concern has its own enum. [`PostboxError`] flattens them into what a
//! run can fail with, so a UI only has to match on one type.

use thiserror::Error;

/// Synthetic run error code for a stream that ended without a terminal event.
pub const ABNORMAL_TERMINATION_CODE: &str = "ABNORMAL_TERMINATION";

/// Transport-level failures: the connection, not the content.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not connect or the request timed out before a response
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body failed mid-stream
    #[error("stream failed: {0}")]
    Stream(String),

    /// The request could not be built or sent
    #[error("request failed: {0}")]
    Request(String),

    /// A non-streaming response body could not be parsed
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport misconfiguration (bad base URL, bad header value)
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Classify a reqwest error into the matching variant
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Connect(format!("request timed out: {}", err))
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::Stream(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// One frame could not be turned into an event. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame's bytes are not UTF-8
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// The frame's payload is not JSON
    #[error("invalid JSON in frame: {reason} (data: {payload})")]
    InvalidJson { payload: String, reason: String },

    /// The payload is JSON but not a well-formed event of its kind
    #[error("malformed {kind} event: {reason}")]
    InvalidEvent { kind: String, reason: String },
}

/// An event broke the ordering rules of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{event} for message '{message_id}' which is not open")]
    UnknownMessage { event: String, message_id: String },

    #[error("message '{0}' started twice")]
    DuplicateMessage(String),

    #[error("{event} for tool call '{tool_call_id}' which is not open")]
    UnknownToolCall { event: String, tool_call_id: String },

    #[error("tool call '{0}' started twice")]
    DuplicateToolCall(String),

    /// The accumulated arguments of a finished tool call are not JSON
    #[error("tool call '{tool_call_id}' ({tool_call_name}) has invalid arguments: {reason}")]
    InvalidToolArguments {
        tool_call_id: String,
        tool_call_name: String,
        reason: String,
    },

    #[error("result for tool call '{0}' arrived before its end")]
    ResultBeforeEnd(String),

    #[error("state delta could not be applied: {0}")]
    InvalidStateDelta(String),
}

/// Why dispatching a single payload failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Top-level error type for a run
///
/// - [`PostboxError::Transport`] - connection refused, non-2xx, stream abort
/// - [`PostboxError::Run`] - the server sent `RUN_ERROR`
/// - [`PostboxError::AbnormalTermination`] - stream closed before a terminal event
/// - [`PostboxError::Protocol`] - an event broke the ordering rules
/// - [`PostboxError::Configuration`] - the client is misconfigured
#[derive(Debug, Error)]
pub enum PostboxError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("run error: {message}")]
    Run {
        message: String,
        code: Option<String>,
    },

    #[error("stream closed before the run finished")]
    AbnormalTermination,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PostboxError {
    /// Returns true if the connection itself failed
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true for server-reported failures and abnormal termination,
    /// which both mean the run did not complete
    pub fn is_run_error(&self) -> bool {
        matches!(self, Self::Run { .. } | Self::AbnormalTermination)
    }

    /// Returns true if an event broke the ordering rules
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns true if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// The run error code, synthetic for abnormal termination
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Run { code, .. } => code.as_deref(),
            Self::AbnormalTermination => Some(ABNORMAL_TERMINATION_CODE),
            _ => None,
        }
    }
}

/// Result type for postbox operations
pub type Result<T> = std::result::Result<T, PostboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        let err: PostboxError = TransportError::Connect("refused".into()).into();
        assert!(err.is_transport());
        assert!(!err.is_run_error());

        let err = PostboxError::Run {
            message: "boom".into(),
            code: Some("E42".into()),
        };
        assert!(err.is_run_error());
        assert_eq!(err.code(), Some("E42"));

        let err = PostboxError::AbnormalTermination;
        assert!(err.is_run_error());
        assert_eq!(err.code(), Some(ABNORMAL_TERMINATION_CODE));

        let err: PostboxError = ProtocolError::ResultBeforeEnd("tc-1".into()).into();
        assert!(err.is_protocol());
        assert_eq!(err.code(), None);

        assert!(PostboxError::Configuration("no base".into()).is_config());
    }

    #[test]
    fn test_display_messages() {
        let cases = [
            (
                PostboxError::from(TransportError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                }),
                "transport error: HTTP 502: bad gateway",
            ),
            (
                PostboxError::Run {
                    message: "model offline".into(),
                    code: None,
                },
                "run error: model offline",
            ),
            (
                PostboxError::AbnormalTermination,
                "stream closed before the run finished",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_dispatch_error_is_transparent() {
        let err: DispatchError = DecodeError::InvalidUtf8.into();
        assert_eq!(err.to_string(), "frame is not valid UTF-8");

        let err: DispatchError = ProtocolError::DuplicateMessage("m1".into()).into();
        assert_eq!(err.to_string(), "message 'm1' started twice");
    }
}
