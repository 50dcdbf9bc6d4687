//! Mock AG-UI backend for the postbox email assistant.
//!
//! Streams scripted runs over Server-Sent-Events and answers tool
//! invocations, so the client can be demoed and tested end to end without
//! a real agent.
//!
//! # Example
//!
//! ```rust,no_run
//! use postbox_server::MockAgentRouter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Echoes the last user message back, word by word
//! let app = MockAgentRouter::new().build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub(crate) mod handler;
pub mod router;
pub mod script;
pub(crate) mod state;

// Re-exports
pub use error::{BuildError, ServerError, ServerResult};
pub use router::MockAgentRouter;
pub use script::{ReplyScript, ToolResponder};
