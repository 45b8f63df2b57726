pub mod tool;
pub mod tools;
pub mod registry;
pub mod dispatcher;
pub mod runtime;
pub mod provider;
pub mod conversation;
pub mod context;
pub mod history;
pub mod stream;
pub mod turn;

pub use tool::{Tool, ToolCallRequest, ToolContext, ToolDefinition, ToolError, ToolOutcome, ToolResult};
pub use registry::{RegistryError, ToolRegistry};
pub use dispatcher::ToolDispatcher;
pub use runtime::{AgenticLoop, TurnError};
pub use provider::{Completion, CompletionClient, CompletionError, DeltaReceiver};
pub use conversation::{Conversation, Message, MessageMetadata, Role, StoredMessage};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use context::{ContextPassage, ContextRetriever, NoContext};
pub use stream::{ChatEvent, StreamDelta, ToolCallDelta};
pub use turn::{ConversationTurn, ToolCallBuilder};
pub use tools::{register_finance_tools, Ledger};
