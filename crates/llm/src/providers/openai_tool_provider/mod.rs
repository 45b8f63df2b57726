//! OpenAI-compatible implementation of [`CompletionClient`].
//!
//! Supports streaming tool calls via SSE, translating between the chat
//! completions wire format and the provider-agnostic [`StreamDelta`] /
//! [`Message`] types.
//!
//! [`CompletionClient`]: oikos_tool_runtime::provider::CompletionClient
//! [`StreamDelta`]: oikos_tool_runtime::stream::StreamDelta
//! [`Message`]: oikos_tool_runtime::conversation::Message

mod sse;
mod streaming;
mod translate;

pub use self::sse::SseDecoder;
pub use self::streaming::OpenAiToolProvider;
