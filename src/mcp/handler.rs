//! Tool dispatch
//!
//! Validates a tool call, resolves a fresh session, runs the matching Gmail
//! operation and renders the result as a single text block.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::context::ServerContext;
use crate::error::Result;
use crate::gmail::types::{Label, MessageDetail, MessageSummary};
use crate::mcp::tools::{ReadArgs, SearchArgs, SendArgs, ToolCall};
use crate::mcp::types::Tool;

/// Tool handler
pub struct ToolHandler {
    context: Arc<ServerContext>,

    /// Serializes calls so only one touches the token file at a time
    in_flight: Mutex<()>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self {
            context,
            in_flight: Mutex::new(()),
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> &[Tool] {
        self.context.registry.list_tools()
    }

    /// Call a tool by name
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String> {
        let call = ToolCall::parse(name, &arguments)?;
        let _guard = self.in_flight.lock().await;

        tracing::info!(tool = call.name(), "Dispatching tool call");

        let session = self.context.credentials.get_session().await?;
        let gmail = &self.context.gmail;

        match call {
            ToolCall::Search(SearchArgs { query, max_results }) => {
                let results = gmail.search(&session, &query, max_results).await?;
                Ok(format_search_results(&results))
            }
            ToolCall::Read(ReadArgs { message_id }) => {
                let message = gmail.read(&session, &message_id).await?;
                Ok(format_message(&message))
            }
            ToolCall::Send(SendArgs { to, subject, body }) => {
                let id = gmail.send(&session, &to, &subject, &body).await?;
                Ok(format_sent(&id))
            }
            ToolCall::ListLabels => {
                let labels = gmail.list_labels(&session).await?;
                Ok(format_labels(&labels))
            }
        }
    }
}

// ==================== Formatting ====================

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().unwrap_or(default)
}

pub fn format_search_results(results: &[MessageSummary]) -> String {
    if results.is_empty() {
        return "No messages found.".to_string();
    }

    results
        .iter()
        .map(|r| {
            format!(
                "ID: {}\nFrom: {}\nSubject: {}\nDate: {}\n---",
                r.id,
                or_default(&r.from, "Unknown"),
                or_default(&r.subject, "No Subject"),
                or_default(&r.date, "Unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_message(message: &MessageDetail) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nDate: {}\n\n{}",
        or_default(&message.from, "Unknown"),
        or_default(&message.to, "Unknown"),
        or_default(&message.subject, "No Subject"),
        or_default(&message.date, "Unknown"),
        message.body
    )
}

pub fn format_sent(message_id: &str) -> String {
    format!("Email sent successfully. Message ID: {}", message_id)
}

pub fn format_labels(labels: &[Label]) -> String {
    if labels.is_empty() {
        return "No labels found.".to_string();
    }

    let mut lines = vec!["Gmail Labels:".to_string(), "---".to_string()];
    lines.extend(
        labels
            .iter()
            .map(|label| format!("- {} (ID: {})", label.name, label.id)),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_empty_search() {
        assert_eq!(format_search_results(&[]), "No messages found.");
    }

    #[test]
    fn test_format_search_defaults() {
        let text = format_search_results(&[MessageSummary {
            id: "m1".to_string(),
            ..Default::default()
        }]);
        assert_eq!(text, "ID: m1\nFrom: Unknown\nSubject: No Subject\nDate: Unknown\n---");
    }

    #[test]
    fn test_format_message() {
        let text = format_message(&MessageDetail {
            id: "m1".to_string(),
            from: Some("a@example.com".to_string()),
            to: Some("b@example.com".to_string()),
            subject: Some("Hi".to_string()),
            date: None,
            body: "Body text".to_string(),
        });
        assert_eq!(
            text,
            "From: a@example.com\nTo: b@example.com\nSubject: Hi\nDate: Unknown\n\nBody text"
        );
    }

    #[test]
    fn test_format_labels() {
        assert_eq!(format_labels(&[]), "No labels found.");

        let labels = vec![
            Label {
                id: "INBOX".to_string(),
                name: "INBOX".to_string(),
                label_type: Some("system".to_string()),
            },
            Label {
                id: "Label_7".to_string(),
                name: "Receipts".to_string(),
                label_type: None,
            },
        ];
        assert_eq!(
            format_labels(&labels),
            "Gmail Labels:\n---\n- INBOX (ID: INBOX)\n- Receipts (ID: Label_7)"
        );
    }

    #[test]
    fn test_format_sent() {
        assert_eq!(format_sent("18c2"), "Email sent successfully. Message ID: 18c2");
    }
}
