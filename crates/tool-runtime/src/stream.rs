use serde::{Deserialize, Serialize};

/// Normalized events decoded from a streaming completion.
/// Provider-agnostic: the provider layer translates wire chunks into these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamDelta {
    /// A fragment of assistant text
    Content(String),
    /// A fragment of one tool call, keyed by its position in the response
    ToolCallDelta(ToolCallDelta),
    /// The stream terminated with its sentinel
    Done,
}

/// Partial tool call. `id` and `name` normally arrive only on the first
/// fragment for an index; `arguments_fragment` is concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_fragment: String,
}

/// Events pushed to the transport while a streaming turn runs.
///
/// Serialized as `{"type": "content", "content": ...}`, `{"type": "error", "message": ...}`
/// and `{"type": "done"}`. Every turn ends with exactly one `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Content { content: String },
    Error { message: String },
    Done,
}

impl ChatEvent {
    pub fn content(content: impl Into<String>) -> Self {
        ChatEvent::Content {
            content: content.into(),
        }
    }
}
