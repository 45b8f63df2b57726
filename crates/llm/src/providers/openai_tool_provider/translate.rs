//! Translation between provider-agnostic conversation types and the OpenAI chat format.

use serde_json::{json, Value};

use oikos_tool_runtime::{
    conversation::{Message, Role},
    provider::{Completion, CompletionError},
    tool::{ToolCallRequest, ToolDefinition},
};

/// Translate a [`ToolDefinition`] into the OpenAI function-tool format.
pub(super) fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Translate a [`Message`] into an OpenAI chat message object.
pub(super) fn message_to_openai(msg: &Message) -> Value {
    let mut out = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });
    match msg.role {
        Role::Assistant if !msg.metadata.tool_calls.is_empty() => {
            out["tool_calls"] = msg
                .metadata
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    })
                })
                .collect();
        }
        Role::Tool => {
            out["tool_call_id"] = json!(msg.metadata.tool_call_id);
        }
        _ => {}
    }
    out
}

/// Build a `/chat/completions` request body. `tools` and `tool_choice` are
/// omitted when no tools are registered.
pub(super) fn request_body(model: &str, messages: &[Message], tools: &[ToolDefinition], stream: bool) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(message_to_openai).collect::<Vec<_>>(),
        "stream": stream,
    });
    if !tools.is_empty() {
        body["tools"] = tools.iter().map(tool_definition_to_openai).collect();
        body["tool_choice"] = json!("auto");
    }
    body
}

/// Extract `choices[0].message` from a non-streaming response.
///
/// Tool-call arguments given as a JSON value instead of an encoded string
/// are re-encoded so downstream code always sees a string.
pub(super) fn parse_completion(resp: &Value) -> Result<Completion, CompletionError> {
    let message = resp
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| CompletionError::InvalidResponse("missing choices[0].message".into()))?;

    let content = message["content"].as_str().map(String::from);
    let tool_calls = match message.get("tool_calls").and_then(Value::as_array) {
        Some(calls) => calls
            .iter()
            .map(|call| {
                let function = &call["function"];
                let arguments = match &function["arguments"] {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                ToolCallRequest {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: function["name"].as_str().unwrap_or_default().to_string(),
                    arguments,
                }
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(Completion { content, tool_calls })
}
