pub mod providers;

pub use providers::create_client;
pub use providers::openai_tool_provider::{OpenAiToolProvider, SseDecoder};
