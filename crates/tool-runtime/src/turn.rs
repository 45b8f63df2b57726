//! Per-turn accumulation state.
//!
//! Streaming responses arrive as interleaved content and tool-call fragments.
//! Fragments are merged by tool-call index and finalized only once the
//! stream has ended; arguments are never parsed while still partial.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::provider::Completion;
use crate::stream::ToolCallDelta;
use crate::tool::ToolCallRequest;

/// A tool call under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallBuilder {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallBuilder {
    /// `id` and `name` are taken from the first fragment that carries them;
    /// argument fragments are appended in arrival order.
    pub fn apply(&mut self, delta: ToolCallDelta) {
        if self.id.is_none() {
            self.id = delta.id.filter(|id| !id.is_empty());
        }
        if self.name.is_none() {
            self.name = delta.name.filter(|name| !name.is_empty());
        }
        self.arguments.push_str(&delta.arguments_fragment);
    }
}

/// State of one loop invocation: the current iteration's partial response
/// plus the iteration counter.
#[derive(Debug, Default)]
pub struct ConversationTurn {
    content: String,
    builders: BTreeMap<u32, ToolCallBuilder>,
    iteration: usize,
}

impl ConversationTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_content(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    pub fn push_tool_delta(&mut self, delta: ToolCallDelta) {
        self.builders.entry(delta.index).or_default().apply(delta);
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Count a completed tool-calling iteration.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    /// Drop whatever the current iteration accumulated.
    pub fn discard(&mut self) {
        self.content.clear();
        self.builders.clear();
    }

    /// Finalize the current iteration into a completion, ordered by index,
    /// leaving the turn empty for the next iteration.
    ///
    /// Ids are made distinct with [`assign_call_ids`], so every result can be
    /// correlated with its request.
    pub fn take_completion(&mut self) -> Completion {
        let content = std::mem::take(&mut self.content);
        let mut tool_calls: Vec<ToolCallRequest> = std::mem::take(&mut self.builders)
            .into_values()
            .map(|builder| ToolCallRequest {
                id: builder.id.unwrap_or_default(),
                name: builder.name.unwrap_or_default(),
                arguments: builder.arguments,
            })
            .collect();
        assign_call_ids(&mut tool_calls);
        Completion {
            content: (!content.is_empty()).then_some(content),
            tool_calls,
        }
    }
}

/// Give every call a distinct non-empty id, generating `call_<uuid>` where
/// the backend sent none or repeated one.
pub fn assign_call_ids(calls: &mut [ToolCallRequest]) {
    let mut seen = HashSet::new();
    for call in calls {
        if call.id.is_empty() || seen.contains(&call.id) {
            call.id = format!("call_{}", Uuid::new_v4().simple());
        }
        seen.insert(call.id.clone());
    }
}

/// What the model asked for in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// No content and no tool calls
    Empty,
    /// Final answer
    Answer(String),
    /// Tools to run before asking the model again
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

impl From<Completion> for ModelReply {
    fn from(completion: Completion) -> Self {
        let content = completion.content.filter(|c| !c.is_empty());
        let mut calls = completion.tool_calls;
        match (content, calls.is_empty()) {
            (None, true) => ModelReply::Empty,
            (Some(content), true) => ModelReply::Answer(content),
            (content, false) => {
                assign_call_ids(&mut calls);
                ModelReply::ToolCalls { content, calls }
            }
        }
    }
}
