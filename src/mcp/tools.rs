//! MCP tool registry
//!
//! Declares the four Gmail tools and turns raw `tools/call` arguments into one
//! typed record per tool.

use serde_json::{json, Map, Value};

use crate::error::{GmailMcpError, McpError, Result, ValidationError};
use crate::mcp::types::Tool;

/// Tool names, in registry order
pub mod names {
    pub const SEARCH: &str = "gmail_search";
    pub const READ: &str = "gmail_read";
    pub const SEND: &str = "gmail_send";
    pub const LIST_LABELS: &str = "gmail_list_labels";
}

/// Default number of search results
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Largest page the Gmail API will return
pub const MAX_RESULTS_LIMIT: u32 = 500;

/// The fixed set of tools this server exposes
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: vec![
                tool_def(
                    names::SEARCH,
                    "Search for emails in Gmail using Gmail's search syntax",
                    search_schema(),
                ),
                tool_def(
                    names::READ,
                    "Read the full content of a specific email by its ID",
                    read_schema(),
                ),
                tool_def(names::SEND, "Send an email through Gmail", send_schema()),
                tool_def(
                    names::LIST_LABELS,
                    "List all labels in the Gmail account",
                    json!({"type": "object", "properties": {}}),
                ),
            ],
        }
    }

    /// All tools, in stable order
    pub fn list_tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `gmail_search`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchArgs {
    pub query: String,
    pub max_results: u32,
}

/// Arguments for `gmail_read`
#[derive(Debug, Clone, PartialEq)]
pub struct ReadArgs {
    pub message_id: String,
}

/// Arguments for `gmail_send`
#[derive(Debug, Clone, PartialEq)]
pub struct SendArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Search(SearchArgs),
    Read(ReadArgs),
    Send(SendArgs),
    ListLabels,
}

impl ToolCall {
    /// Validate a tool name and its arguments.
    ///
    /// Unknown names are rejected before the arguments are looked at.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                if !ToolRegistry::new().contains(name) {
                    return Err(unknown_tool(name));
                }
                return Err(GmailMcpError::Validation(ValidationError::InvalidParameter {
                    name: "arguments".to_string(),
                    message: "expected an object".to_string(),
                }));
            }
        };

        match name {
            names::SEARCH => Ok(ToolCall::Search(SearchArgs {
                query: required_str(args, "query")?,
                max_results: max_results(args)?,
            })),
            names::READ => Ok(ToolCall::Read(ReadArgs {
                message_id: required_str(args, "message_id")?,
            })),
            names::SEND => Ok(ToolCall::Send(SendArgs {
                to: required_str(args, "to")?,
                subject: required_str(args, "subject")?,
                body: required_str(args, "body")?,
            })),
            names::LIST_LABELS => Ok(ToolCall::ListLabels),
            _ => Err(unknown_tool(name)),
        }
    }

    /// Registry name of this call
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Search(_) => names::SEARCH,
            ToolCall::Read(_) => names::READ,
            ToolCall::Send(_) => names::SEND,
            ToolCall::ListLabels => names::LIST_LABELS,
        }
    }
}

fn unknown_tool(name: &str) -> GmailMcpError {
    GmailMcpError::Mcp(McpError::UnknownTool {
        name: name.to_string(),
    })
}

fn required_str(args: &Map<String, Value>, field: &str) -> Result<String> {
    match args.get(field) {
        None | Some(Value::Null) => Err(GmailMcpError::Validation(ValidationError::MissingField {
            field: field.to_string(),
        })),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(GmailMcpError::Validation(ValidationError::InvalidParameter {
            name: field.to_string(),
            message: format!("expected a string, got {}", other),
        })),
    }
}

fn max_results(args: &Map<String, Value>) -> Result<u32> {
    let value = match args.get("max_results") {
        None | Some(Value::Null) => return Ok(DEFAULT_MAX_RESULTS),
        Some(value) => value,
    };

    value
        .as_u64()
        .filter(|n| (1..=MAX_RESULTS_LIMIT as u64).contains(n))
        .map(|n| n as u32)
        .ok_or_else(|| {
            GmailMcpError::Validation(ValidationError::InvalidParameter {
                name: "max_results".to_string(),
                message: format!("expected an integer between 1 and {}, got {}", MAX_RESULTS_LIMIT, value),
            })
        })
}

// ==================== Tool Schemas ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Gmail search query (e.g., 'from:example@gmail.com', 'subject:meeting', 'is:unread')"
            },
            "max_results": {
                "type": "integer",
                "description": "Maximum number of results to return (default: 10)",
                "default": DEFAULT_MAX_RESULTS
            }
        },
        "required": ["query"]
    })
}

fn read_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message_id": {
                "type": "string",
                "description": "The ID of the email message to read"
            }
        },
        "required": ["message_id"]
    })
}

fn send_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "to": {
                "type": "string",
                "description": "Recipient email address"
            },
            "subject": {
                "type": "string",
                "description": "Email subject"
            },
            "body": {
                "type": "string",
                "description": "Email body content"
            }
        },
        "required": ["to", "subject", "body"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order() {
        let registry = ToolRegistry::new();
        let names: Vec<&str> = registry.list_tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["gmail_search", "gmail_read", "gmail_send", "gmail_list_labels"]
        );
        assert!(registry.list_tools().iter().all(|t| !t.description.is_empty()));
    }

    #[test]
    fn test_search_defaults() {
        let call = ToolCall::parse("gmail_search", &json!({"query": "is:unread"})).unwrap();
        assert_eq!(
            call,
            ToolCall::Search(SearchArgs {
                query: "is:unread".to_string(),
                max_results: 10
            })
        );
    }

    #[test]
    fn test_max_results_bounds() {
        let ok = ToolCall::parse("gmail_search", &json!({"query": "a", "max_results": 500})).unwrap();
        assert_eq!(ok.name(), names::SEARCH);

        for bad in [json!(0), json!(501), json!(-1), json!("5"), json!(2.5)] {
            let err = ToolCall::parse("gmail_search", &json!({"query": "a", "max_results": bad}))
                .unwrap_err();
            assert!(matches!(
                err,
                GmailMcpError::Validation(ValidationError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_missing_field() {
        let err = ToolCall::parse("gmail_send", &json!({"to": "a@b.com", "body": "x"})).unwrap_err();
        match err {
            GmailMcpError::Validation(ValidationError::MissingField { field }) => {
                assert_eq!(field, "subject")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_type() {
        let err = ToolCall::parse("gmail_read", &json!({"message_id": 42})).unwrap_err();
        assert!(matches!(
            err,
            GmailMcpError::Validation(ValidationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_list_labels_accepts_missing_arguments() {
        assert_eq!(
            ToolCall::parse("gmail_list_labels", &Value::Null).unwrap(),
            ToolCall::ListLabels
        );
    }

    #[test]
    fn test_unknown_tool_checked_first() {
        for args in [json!({}), json!("not an object")] {
            let err = ToolCall::parse("gmail_delete", &args).unwrap_err();
            assert!(matches!(err, GmailMcpError::Mcp(McpError::UnknownTool { .. })));
        }
    }
}
