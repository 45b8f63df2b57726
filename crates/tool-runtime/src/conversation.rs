use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCallRequest, ToolResult};

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Tool-calling correlation data attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Set on assistant messages that requested tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on tool messages: the request this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A single prompt message, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant message requesting tools; `content` may be absent.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            metadata: MessageMetadata {
                tool_calls,
                tool_call_id: None,
            },
        }
    }

    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.content.clone()),
            metadata: MessageMetadata {
                tool_calls: Vec::new(),
                tool_call_id: Some(result.tool_call_id.clone()),
            },
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            metadata: MessageMetadata::default(),
        }
    }
}

/// A message as persisted by the history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Monotonically increasing, assigned by the store
    pub id: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub message: Message,
}

/// The prompt for one turn: system prompt plus chronological messages.
///
/// Append-only while the turn runs.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Build a prompt from recent history (oldest first).
    ///
    /// A history window can start in the middle of a tool exchange; `tool`
    /// messages whose assistant request fell outside the window are dropped,
    /// since the API rejects results without a preceding request.
    pub fn from_history(system_prompt: impl Into<String>, history: Vec<StoredMessage>) -> Self {
        let mut conversation = Self::new(system_prompt);
        conversation.messages.extend(
            history
                .into_iter()
                .map(|stored| stored.message)
                .skip_while(|m| m.role == Role::Tool),
        );
        conversation
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append `extra` to the system prompt, separated by a blank line.
    pub fn extend_system_prompt(&mut self, extra: &str) {
        if let Some(system) = self.messages.iter_mut().find(|m| m.role == Role::System) {
            let content = system.content.get_or_insert_with(String::new);
            content.push_str("\n\n");
            content.push_str(extra);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
