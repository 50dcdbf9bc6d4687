//! Router builder for the mock endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::BuildError;
use crate::handler::{agent_handler, tool_handler};
use crate::script::{ReplyScript, ToolResponder};
use crate::state::AppState;

/// Builder for the mock AG-UI backend.
///
/// Serves `POST /agent` and `POST /tool/:tool_name`.
///
/// # Example
///
/// ```rust,no_run
/// use postbox_server::{MockAgentRouter, ReplyScript};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = MockAgentRouter::new()
///     .reply_script(ReplyScript::fixed(["Checking ", "your inbox."]))
///     .tool("getUnreadEmails", |_args| Ok(json!({"emails": []})))
///     .build()?;
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct MockAgentRouter {
    script: ReplyScript,
    tools: HashMap<String, ToolResponder>,
    cors: bool,
}

impl MockAgentRouter {
    /// Create a builder that echoes the last user message.
    pub fn new() -> Self {
        Self {
            script: ReplyScript::default(),
            tools: HashMap::new(),
            cors: true,
        }
    }

    /// Set how `/agent` replies.
    pub fn reply_script(mut self, script: ReplyScript) -> Self {
        self.script = script;
        self
    }

    /// Register the responder for one tool name.
    ///
    /// Registering the same name twice keeps the last responder.
    pub fn tool<F>(mut self, name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.tools.insert(name.into(), Arc::new(responder));
        self
    }

    /// Do not add the permissive CORS layer.
    ///
    /// By default any origin may call the endpoints, since the browser UI is
    /// usually served from another port.
    pub fn without_cors(mut self) -> Self {
        self.cors = false;
        self
    }

    /// Build the router.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidToolName`] if a tool was registered under
    /// a name that cannot appear as a single path segment.
    pub fn build(self) -> Result<Router, BuildError> {
        if let Some(name) = self
            .tools
            .keys()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(BuildError::InvalidToolName(name.clone()));
        }

        let state = AppState::new(self.script, self.tools);

        let mut router = Router::new()
            .route("/agent", post(agent_handler))
            .route("/tool/:tool_name", post(tool_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.cors {
            router = router.layer(CorsLayer::permissive());
        }

        Ok(router)
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

impl Default for MockAgentRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
