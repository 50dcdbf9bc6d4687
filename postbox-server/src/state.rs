//! Application state for the mock server.

use std::collections::HashMap;
use std::sync::Arc;

use crate::script::{ReplyScript, ToolResponder};

/// Shared application state, cloned for each request handler.
#[derive(Clone)]
pub struct AppState {
    /// How `/agent` answers.
    pub script: ReplyScript,
    /// How `/tool/:tool_name` answers, by tool name.
    pub tools: Arc<HashMap<String, ToolResponder>>,
}

impl AppState {
    pub fn new(script: ReplyScript, tools: HashMap<String, ToolResponder>) -> Self {
        Self {
            script,
            tools: Arc::new(tools),
        }
    }
}
