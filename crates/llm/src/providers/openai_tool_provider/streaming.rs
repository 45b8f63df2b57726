//! [`CompletionClient`] implementation for OpenAI-compatible chat completion APIs.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use oikos_core::config::LlmConfig;
use oikos_tool_runtime::{
    conversation::Message,
    provider::{Completion, CompletionClient, CompletionError, DeltaReceiver},
    tool::ToolDefinition,
};

use super::sse::pump;
use super::translate::{parse_completion, request_body};

const DEFAULT_STREAM_BUFFER: usize = 64;

/// OpenAI-compatible provider with streaming tool-call support.
///
/// Talks to `{api_url}/chat/completions`; works against OpenAI itself and
/// local gateways that mimic it.
pub struct OpenAiToolProvider {
    client: reqwest::Client,
    config: LlmConfig,
    stream_buffer: usize,
}

impl OpenAiToolProvider {
    /// Create a provider from config. The stream timeout bounds connecting,
    /// the wait for response headers and each wait for the next chunk of a
    /// streaming response.
    pub fn new(config: LlmConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.stream_timeout())
            .build()
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        Ok(Self {
            client,
            config,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        })
    }

    /// Capacity of the channel between the SSE pump and the consumer.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
    }

    async fn try_complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Completion, CompletionError> {
        let body = request_body(&self.config.model, messages, tools, false);
        debug!(model = %self.config.model, messages = messages.len(), tools = tools.len(), "sending completion request");

        let response = self
            .post(&body)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        parse_completion(&resp)
    }
}

#[async_trait]
impl CompletionClient for OpenAiToolProvider {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Completion {
        match self.try_complete(messages, tools).await {
            Ok(completion) => completion,
            Err(e) => {
                error!(model = %self.config.model, error = %e, "completion request failed");
                Completion::apology()
            }
        }
    }

    async fn stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<DeltaReceiver, CompletionError> {
        let body = request_body(&self.config.model, messages, tools, true);
        debug!(model = %self.config.model, messages = messages.len(), tools = tools.len(), "starting streaming request");

        // The idle timeout in `pump` only starts once headers arrive.
        let stream_timeout = self.config.stream_timeout();
        let response = tokio::time::timeout(stream_timeout, self.post(&body).header(ACCEPT, "text/event-stream").send())
            .await
            .map_err(|_| CompletionError::Network(format!("no response headers within {}s", stream_timeout.as_secs())))?
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.config.stream_timeout(), response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(self.stream_buffer);
        tokio::spawn(pump(response.bytes_stream(), tx, self.config.stream_timeout()));
        Ok(rx)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
