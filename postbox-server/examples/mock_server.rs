//! Mock email assistant backend.
//!
//! Streams a canned inbox summary for every run and answers the email tools
//! with fixed data, so the client can be tried without a real agent.
//!
//! Run with:
//! ```sh
//! cargo run -p postbox-server --example mock_server
//! ```
//!
//! Test with curl:
//! ```sh
//! curl -X POST http://localhost:8000/agent \
//!   -H "Content-Type: application/json" \
//!   -d '{"threadId": "t-1", "messages": [{"id": "1", "role": "user", "content": "Hi"}]}' \
//!   -N
//! ```

use std::time::Duration;

use postbox_server::{MockAgentRouter, ReplyScript};
use serde_json::{json, Value};

const DEFAULT_PORT: u16 = 8000;

fn sample_emails() -> Value {
    json!({
        "emails": [
            {
                "id": 1,
                "subject": "Meeting invitation",
                "sender": "market@example.com",
                "summary": "Product meeting today at 3pm"
            },
            {
                "id": 2,
                "subject": "Server update",
                "sender": "tech@example.com",
                "summary": "Server maintenance tomorrow at 2am"
            }
        ]
    })
}

fn inbox_reply() -> ReplyScript {
    ReplyScript::fixed([
        "Hello! I'm your email assistant. ",
        "I understand your request and I'm working on it... ",
        "I looked up the emails relevant to your question. ",
        "Here is the summary you asked for: ",
        "\n\n1. Meeting invitation from marketing - today at 3pm\n\
         2. Server update notice from tech support - tomorrow at 2am\n\
         3. Monthly report from finance - attachment included ",
        "\n\nLet me know if you need more details! ",
    ])
    .with_delay(Duration::from_millis(500))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = match std::env::var("POSTBOX_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => DEFAULT_PORT,
    };

    let app = MockAgentRouter::new()
        .reply_script(inbox_reply())
        .tool("searchEmail", |_args| Ok(sample_emails()))
        .tool("getUnreadEmails", |_args| Ok(sample_emails()))
        .tool("getTodaysEmailSummary", |_args| {
            Ok(json!({
                "summary": "3 emails received today: 2 unread, 1 read",
                "unreadCount": 2,
                "importantCount": 1
            }))
        })
        .build()?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    println!("Mock agent running at http://localhost:{}", port);
    println!("Agent endpoint: POST http://localhost:{}/agent", port);
    println!("Tool endpoint:  POST http://localhost:{}/tool/:tool_name", port);

    axum::serve(listener, app).await?;

    Ok(())
}
