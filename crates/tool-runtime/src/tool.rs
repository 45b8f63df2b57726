use async_trait::async_trait;
use oikos_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Describes a tool's interface for LLM consumption.
/// Maps to the OpenAI `{"type": "function", "function": {...}}` format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "create_transaction", "get_wallets")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected arguments
    pub parameters: Value,
}

/// Represents an LLM requesting execution of a tool.
///
/// `arguments` stays JSON-encoded exactly as the model produced it; it is
/// only decoded by the dispatcher right before the tool runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Result of executing a tool, sent back to the LLM as a `tool` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCallRequest id
    pub tool_call_id: String,
    /// Result text shown to the model
    pub content: String,
    /// Whether this result represents a failure
    pub is_error: bool,
}

/// What a tool (or the dispatcher on its behalf) reports back, before it is
/// correlated with a tool call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    pub fn into_result(self, tool_call_id: impl Into<String>) -> ToolResult {
        ToolResult {
            tool_call_id: tool_call_id.into(),
            content: self.content,
            is_error: self.is_error,
        }
    }
}

/// Context passed to tool execution.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext {
    /// The user on whose data the tool acts
    pub user_id: UserId,
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Names of other tools this one relies on. Advertised to the model so it
    /// knows to call them first (e.g. look up a wallet before creating a transaction).
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Execute the tool with the given JSON arguments.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Read a required string argument.
pub fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidInput(format!("missing '{key}' field")))
}

/// Read an optional string argument, treating blanks as absent.
pub fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Simple echo tool for testing purposes.
#[cfg(any(test, feature = "test-utils"))]
pub struct EchoTool;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes back the input message. For testing.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let message = required_str(&input, "message")?;
        Ok(ToolOutcome::success(format!("user {}: {}", context.user_id, message)))
    }
}
