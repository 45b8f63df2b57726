pub mod openai_tool_provider;

use oikos_core::config::{ChatConfig, LlmConfig};
use oikos_tool_runtime::provider::CompletionError;
use tracing::{info, warn};

use self::openai_tool_provider::OpenAiToolProvider;

/// Create the completion client described by config.
pub fn create_client(llm_config: &LlmConfig, chat_config: &ChatConfig) -> Result<OpenAiToolProvider, CompletionError> {
    if !llm_config.is_configured() {
        warn!(url = %llm_config.api_url, "OPENAI_API_KEY not set, using placeholder key");
    }
    let client = OpenAiToolProvider::new(llm_config.clone())?.with_stream_buffer(chat_config.stream_buffer);
    info!(url = %llm_config.completions_url(), model = %llm_config.model, "completion client ready");
    Ok(client)
}
