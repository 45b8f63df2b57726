use crate::conversation::Message;
use crate::stream::StreamDelta;
use crate::tool::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Shown to the user when a completion request fails for any reason.
pub const COMPLETION_FAILED_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Shown to the user when a streaming completion cannot be opened.
pub const CONNECTION_FAILED_MESSAGE: &str = "Sorry, I couldn't reach the AI service. Please try again.";

/// Receiving half of a streaming completion. The stream ends when the
/// channel closes; dropping the receiver cancels the producer.
pub type DeltaReceiver = mpsc::Receiver<Result<StreamDelta, CompletionError>>;

/// A fully received (non-streaming) model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// The fallback returned in place of an error.
    pub fn apology() -> Self {
        Self::text(COMPLETION_FAILED_MESSAGE)
    }
}

/// Trait for chat completion backends that support tool calling.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agentic loop), not the provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One non-streaming request. Failures are logged and mapped to
    /// [`Completion::apology`]; this never errors.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Completion;

    /// Open a streaming request. The response status is checked before this
    /// returns, so an `Err` means no delta was ever produced.
    async fn stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<DeltaReceiver, CompletionError>;

    /// Provider name for logging/debugging (e.g., "openai", "mock")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Scripted completion client for testing the agentic loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::stream::ToolCallDelta;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Completion(Completion),
        Stream(Vec<Result<StreamDelta, CompletionError>>),
        StreamFailure(CompletionError),
    }

    /// One request as seen by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub messages: Vec<Message>,
        pub tools: Vec<ToolDefinition>,
        pub streaming: bool,
    }

    /// Returns queued responses in FIFO order and records every request.
    ///
    /// With nothing queued, `complete` returns an empty completion and
    /// `stream` yields only `Done`.
    #[derive(Default)]
    pub struct MockCompletionClient {
        responses: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockCompletionClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_completion(&self, completion: Completion) {
            self.push(Scripted::Completion(completion));
        }

        pub fn queue_text(&self, text: &str) {
            self.queue_completion(Completion::text(text));
        }

        /// Queue a non-streaming response requesting one tool.
        pub fn queue_tool_call(&self, id: &str, name: &str, arguments: &str) {
            self.queue_completion(Completion {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            });
        }

        /// Queue a stream of deltas; `Done` is not appended automatically.
        pub fn queue_stream(&self, deltas: Vec<StreamDelta>) {
            self.push(Scripted::Stream(deltas.into_iter().map(Ok).collect()));
        }

        /// Queue a stream that yields `deltas` and then fails mid-read.
        pub fn queue_broken_stream(&self, deltas: Vec<StreamDelta>, error: CompletionError) {
            let mut items: Vec<_> = deltas.into_iter().map(Ok).collect();
            items.push(Err(error));
            self.push(Scripted::Stream(items));
        }

        /// Queue a stream that fails to open.
        pub fn queue_stream_failure(&self, error: CompletionError) {
            self.push(Scripted::StreamFailure(error));
        }

        /// Queue a streamed text reply split into the given fragments.
        pub fn queue_stream_text(&self, fragments: &[&str]) {
            let mut deltas: Vec<_> = fragments
                .iter()
                .map(|f| StreamDelta::Content(f.to_string()))
                .collect();
            deltas.push(StreamDelta::Done);
            self.queue_stream(deltas);
        }

        /// Queue a streamed single tool call whose arguments arrive in fragments.
        pub fn queue_stream_tool_call(&self, id: &str, name: &str, fragments: &[&str]) {
            let mut deltas = vec![StreamDelta::ToolCallDelta(ToolCallDelta {
                index: 0,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments_fragment: String::new(),
            })];
            deltas.extend(fragments.iter().map(|f| {
                StreamDelta::ToolCallDelta(ToolCallDelta {
                    index: 0,
                    arguments_fragment: f.to_string(),
                    ..Default::default()
                })
            }));
            deltas.push(StreamDelta::Done);
            self.queue_stream(deltas);
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn push(&self, scripted: Scripted) {
            self.responses.lock().unwrap().push_back(scripted);
        }

        fn next(&self, messages: &[Message], tools: &[ToolDefinition], streaming: bool) -> Option<Scripted> {
            self.requests.lock().unwrap().push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
                streaming,
            });
            self.responses.lock().unwrap().pop_front()
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompletionClient {
        async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Completion {
            match self.next(messages, tools, false) {
                Some(Scripted::Completion(completion)) => completion,
                Some(_) => panic!("streaming response queued for a non-streaming request"),
                None => Completion::default(),
            }
        }

        async fn stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<DeltaReceiver, CompletionError> {
            let items = match self.next(messages, tools, true) {
                Some(Scripted::Stream(items)) => items,
                Some(Scripted::StreamFailure(e)) => return Err(e),
                Some(Scripted::Completion(_)) => panic!("non-streaming response queued for a streaming request"),
                None => vec![Ok(StreamDelta::Done)],
            };
            let (tx, rx) = mpsc::channel(items.len().max(1));
            for item in items {
                tx.try_send(item).unwrap();
            }
            Ok(rx)
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
