//! Canned behavior of the mock backend.
//!
//! The server itself knows nothing about email. What it says is decided by a
//! [`ReplyScript`] and what its tools return by [`ToolResponder`]s, both
//! supplied by the embedding program.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use postbox_core::RunAgentInput;
use serde_json::Value;

type ReplyFn = dyn Fn(&RunAgentInput) -> Vec<String> + Send + Sync;

/// Produces the text chunks of the assistant reply for one run.
///
/// Each chunk becomes one `TEXT_MESSAGE_CONTENT` event; `delay` is waited
/// before each of them.
#[derive(Clone)]
pub struct ReplyScript {
    reply: Arc<ReplyFn>,
    delay: Duration,
}

impl fmt::Debug for ReplyScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyScript")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ReplyScript {
    /// Reply with whatever `reply` computes from the request.
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&RunAgentInput) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            reply: Arc::new(reply),
            delay: Duration::ZERO,
        }
    }

    /// Always reply with the same chunks.
    pub fn fixed<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks: Vec<String> = chunks.into_iter().map(Into::into).collect();
        Self::new(move |_| chunks.clone())
    }

    /// Echo the last user message back, one word per chunk.
    pub fn echo() -> Self {
        Self::new(|input| {
            let text = match input.last_user_message() {
                Some(message) => format!("You said: {}", message.content),
                None => "Hello! How can I help with your email today?".to_string(),
            };
            text.split_inclusive(' ').map(str::to_string).collect()
        })
    }

    /// Wait `delay` before each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The chunks to stream for `input`.
    pub fn chunks(&self, input: &RunAgentInput) -> Vec<String> {
        (self.reply)(input)
    }
}

impl Default for ReplyScript {
    fn default() -> Self {
        Self::echo()
    }
}

/// Computes the result of one tool invocation from its arguments.
///
/// `Ok` becomes the `content` of the response, serialized as a JSON string.
/// `Err` is answered with a 500.
pub type ToolResponder = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use postbox_core::{Message, Role};
    use serde_json::json;

    fn input(messages: Vec<Message>) -> RunAgentInput {
        RunAgentInput {
            thread_id: None,
            run_id: None,
            messages,
            tools: vec![],
            context: vec![],
            forwarded_props: json!({}),
            state: json!({}),
        }
    }

    #[test]
    fn test_echo_splits_words() {
        let script = ReplyScript::echo();
        let chunks = script.chunks(&input(vec![
            Message::with_id("u1", Role::User, "old"),
            Message::with_id("a1", Role::Assistant, "reply"),
            Message::with_id("u2", Role::User, "any mail?"),
        ]));

        assert_eq!(chunks, vec!["You ", "said: ", "any ", "mail?"]);
        assert_eq!(chunks.concat(), "You said: any mail?");
    }

    #[test]
    fn test_echo_without_user_message_greets() {
        let chunks = ReplyScript::echo().chunks(&input(vec![]));
        assert!(chunks.concat().starts_with("Hello!"));
    }

    #[test]
    fn test_fixed_script_and_delay() {
        let script = ReplyScript::fixed(["a", "b"]).with_delay(Duration::from_millis(20));
        assert_eq!(script.chunks(&input(vec![])), vec!["a", "b"]);
        assert_eq!(script.delay(), Duration::from_millis(20));
    }

    #[test]
    fn test_default_is_echo_without_delay() {
        let script = ReplyScript::default();
        assert_eq!(script.delay(), Duration::ZERO);
        let chunks = script.chunks(&input(vec![Message::user("hi")]));
        assert_eq!(chunks.concat(), "You said: hi");
    }
}
