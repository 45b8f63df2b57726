//! Resolves tool calls to registered tools and normalizes every outcome.
//!
//! Nothing a tool does can escape this boundary: unknown names, undecodable
//! arguments, tool errors and panics all come back as a failed [`ToolOutcome`]
//! whose text the model sees in its next turn.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use oikos_core::UserId;
use serde_json::Value;
use tracing::{info, warn};

use crate::registry::ToolRegistry;
use crate::tool::{ToolCallRequest, ToolContext, ToolDefinition, ToolOutcome, ToolResult};

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The catalog advertised to the model on every request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    /// Execute one tool by name with JSON-encoded arguments on behalf of `user_id`.
    pub async fn execute(&self, name: &str, arguments: &str, user_id: UserId) -> ToolOutcome {
        info!(tool = name, user_id, arguments, "executing tool");

        let Some(tool) = self.registry.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            return ToolOutcome::failure(format!("Unknown tool: {name}"));
        };

        let input = match parse_arguments(arguments) {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = name, error = %e, "undecodable tool arguments");
                return ToolOutcome::failure(format!("Invalid arguments for {name}: {e}"));
            }
        };

        let ctx = ToolContext { user_id };
        match AssertUnwindSafe(tool.execute(input, &ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "tool execution failed");
                ToolOutcome::failure(format!("Tool error: {e}"))
            }
            Err(_) => {
                warn!(tool = name, "tool panicked");
                ToolOutcome::failure(format!("Tool error: {name} failed unexpectedly"))
            }
        }
    }

    /// Execute a turn's tool calls one at a time, in the order the model emitted them.
    pub async fn execute_all(&self, calls: &[ToolCallRequest], user_id: UserId) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = self.execute(&call.name, &call.arguments, user_id).await;
            results.push(outcome.into_result(call.id.clone()));
        }
        results
    }
}

/// Decode tool arguments. Blank or `null` means "no arguments".
fn parse_arguments(arguments: &str) -> Result<Value, String> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(arguments).map_err(|e| e.to_string())? {
        Value::Null => Ok(Value::Object(Default::default())),
        v @ Value::Object(_) => Ok(v),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}
