//! Terminal front-end for the email assistant.
//!
//! Streams one reply per line of input from the agent backend at
//! `$POSTBOX_API_URL` (default `http://localhost:8000`).
//!
//! Run the mock backend first, then:
//!
//! ```sh
//! cargo run -p postbox-server --example mock_server
//! cargo run -p postbox-core --example email_assistant
//! ```
//!
//! Commands: `/clear` starts a new thread, `/quit` exits.

use std::io::{BufRead, Write};

use postbox_core::{
    CancellationToken, Conversation, Message, PostboxError, RunEvent, RunParameters,
    ToolDefinition,
};
use serde_json::json;

fn email_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "searchEmail",
            "Search emails",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "dateRange": {
                        "type": "object",
                        "properties": {
                            "start": {"type": "string", "format": "date"},
                            "end": {"type": "string", "format": "date"}
                        },
                        "description": "Date range"
                    },
                    "sender": {"type": "string", "description": "Sender address"},
                    "unreadOnly": {"type": "boolean", "description": "Only unread emails"}
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::new(
            "getTodaysEmailSummary",
            "Summarize today's emails",
            json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "format": "date", "description": "Day to summarize, default today"}
                }
            }),
        ),
        ToolDefinition::new(
            "getUnreadEmails",
            "List unread emails",
            json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "number", "description": "Maximum number of emails"}
                }
            }),
        ),
        ToolDefinition::new(
            "confirmAction",
            "Ask the user to confirm an action",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "description": "Action to confirm"},
                    "importance": {"type": "string", "enum": ["low", "medium", "high", "critical"]},
                    "details": {"type": "string"}
                },
                "required": ["action"]
            }),
        ),
    ]
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::TextMessageStart { .. } => print!("assistant> "),
        RunEvent::TextMessageContent { delta, .. } => print!("{}", delta),
        RunEvent::TextMessageEnd { .. } => println!(),
        RunEvent::ToolCallArgs {
            tool_call_name,
            partial_args: Some(args),
            ..
        } => print!("\r[{} {}]", tool_call_name, args),
        RunEvent::ToolCallEnd {
            tool_call_name,
            args,
            ..
        } => println!("\r[{} {}]", tool_call_name, args),
        RunEvent::ToolCallResult { content, .. } => println!("tool> {}", content),
        RunEvent::DecodeFailed { error } | RunEvent::ProtocolViolation { error } => {
            eprintln!("(skipped: {})", error)
        }
        _ => {}
    }
    let _ = std::io::stdout().flush();
}

fn describe(error: &PostboxError) -> String {
    match error {
        PostboxError::Transport(e) => format!("Could not reach the assistant: {}", e),
        PostboxError::Run { message, .. } => format!("The assistant failed: {}", message),
        PostboxError::AbnormalTermination => "The reply was cut off.".to_string(),
        PostboxError::Protocol(e) => format!("The reply was garbled: {}", e),
        PostboxError::Configuration(e) => format!("Configuration problem: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut conversation = Conversation::from_env()?;
    for tool in email_tools() {
        conversation.add_tool(tool);
    }

    println!(
        "Email assistant at {} (thread {})",
        conversation.transport().api_base(),
        conversation.thread_id()
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                conversation.clear_history();
                println!("New thread {}", conversation.thread_id());
                continue;
            }
            _ => {}
        }

        // Ctrl-C cancels the current reply instead of exiting.
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        conversation.add_message(Message::user(input));
        let params = RunParameters::new()
            .context("client", "terminal")
            .cancellation(cancel);

        match conversation.run(params, print_event).await {
            Ok(outcome) if outcome.is_cancelled() => println!("\n(cancelled)"),
            Ok(_) => {}
            Err(e) => eprintln!("{}", describe(&e)),
        }
        watcher.abort();
    }

    Ok(())
}
