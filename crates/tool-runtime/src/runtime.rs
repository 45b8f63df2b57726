use crate::context::{format_context, is_simple_greeting, ContextRetriever, NoContext};
use crate::conversation::{Conversation, Message, StoredMessage};
use crate::dispatcher::ToolDispatcher;
use crate::history::HistoryStore;
use crate::provider::{CompletionClient, COMPLETION_FAILED_MESSAGE, CONNECTION_FAILED_MESSAGE};
use crate::stream::{ChatEvent, StreamDelta};
use crate::tool::{ToolCallRequest, ToolDefinition};
use crate::turn::{ConversationTurn, ModelReply};
use oikos_core::config::ChatConfig;
use oikos_core::{OikosError, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Final content when the model keeps requesting tools past the iteration cap.
pub const MAX_ITERATIONS_MESSAGE: &str =
    "I couldn't finish this request within the allowed number of steps. Please try rephrasing it.";

/// Sent as an `error` event when a turn fails outside the model/tool protocol.
pub const TURN_FAILED_MESSAGE: &str = "An error occurred. Please try again.";

/// The core agentic loop that orchestrates model ↔ tool execution.
///
/// Flow: User → model → tool calls → execute → results → model → ... → final text
pub struct AgenticLoop {
    client: Arc<dyn CompletionClient>,
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<dyn HistoryStore>,
    retriever: Arc<dyn ContextRetriever>,
    config: ChatConfig,
}

/// Where the messages of a turn end up besides the in-flight prompt.
#[derive(Clone, Copy)]
enum Persist {
    /// Appended to the user's history as they are produced
    History,
    /// Prompt only
    Nowhere,
}

enum Step {
    Finished(Option<String>),
    Continue,
}

impl AgenticLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        dispatcher: Arc<ToolDispatcher>,
        history: Arc<dyn HistoryStore>,
        config: ChatConfig,
    ) -> Self {
        Self {
            client,
            dispatcher,
            history,
            retriever: Arc::new(NoContext),
            config,
        }
    }

    /// Source of knowledge-base context for streaming turns.
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    /// Run one streaming chat turn for `user_id`.
    ///
    /// Content fragments are forwarded as they arrive. The returned channel
    /// always yields exactly one [`ChatEvent::Done`], preceded by one
    /// [`ChatEvent::Error`] if the turn failed outside the model/tool
    /// protocol. Dropping the receiver stops the turn at its next step.
    pub fn stream_chat(self: &Arc<Self>, user_id: UserId, message: String) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let events = tx.clone();
            let turn = tokio::spawn(async move { this.streaming_turn(user_id, message, &events).await });

            let failure = match turn.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("turn task failed: {e}")),
            };
            if let Some(reason) = failure {
                error!(user_id, error = %reason, "chat turn failed");
                let _ = tx
                    .send(ChatEvent::Error {
                        message: TURN_FAILED_MESSAGE.to_string(),
                    })
                    .await;
            }
            let _ = tx.send(ChatEvent::Done).await;
        });

        rx
    }

    /// Run a full non-streaming turn over `[system, user]` and return the
    /// final content. Nothing is written to history.
    pub async fn run_with_tools(&self, user_id: UserId, system_prompt: &str, user_message: &str) -> String {
        let mut conversation = Conversation::new(system_prompt);
        conversation.add_user_message(user_message);
        let tools = self.dispatcher.definitions();
        let mut turn = ConversationTurn::new();

        while turn.iteration() < self.config.max_iterations {
            debug!(user_id, iteration = turn.iteration(), "requesting completion");
            let completion = self.client.complete(conversation.messages(), &tools).await;

            // Without persistence nothing in a step can fail.
            match self
                .step(user_id, Persist::Nowhere, &mut conversation, completion.into())
                .await
            {
                Ok(Step::Finished(content)) => return content.unwrap_or_default(),
                Ok(Step::Continue) => turn.advance(),
                Err(e) => {
                    error!(user_id, error = %e, "batch turn failed");
                    return COMPLETION_FAILED_MESSAGE.to_string();
                }
            }
        }

        warn!(user_id, max_iterations = self.config.max_iterations, "iteration cap reached");
        MAX_ITERATIONS_MESSAGE.to_string()
    }

    /// The user's most recent history, oldest first.
    pub async fn history(&self, user_id: UserId, limit: usize) -> Result<Vec<StoredMessage>, TurnError> {
        Ok(self.history.recent_messages(user_id, limit).await?)
    }

    pub async fn clear_history(&self, user_id: UserId) -> Result<usize, TurnError> {
        let deleted = self.history.clear(user_id).await?;
        info!(user_id, deleted, "cleared chat history");
        Ok(deleted)
    }

    async fn streaming_turn(
        &self,
        user_id: UserId,
        message: String,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), TurnError> {
        self.history.append(user_id, Message::user(message.as_str())).await?;
        let recent = self
            .history
            .recent_messages(user_id, self.config.memory_limit)
            .await?;
        let mut conversation = Conversation::from_history(self.config.system_prompt.as_str(), recent);
        if let Some(context) = self.knowledge_context(user_id, &message).await {
            conversation.extend_system_prompt(&context);
        }
        let tools = self.dispatcher.definitions();
        let mut turn = ConversationTurn::new();

        while turn.iteration() < self.config.max_iterations {
            if events.is_closed() {
                info!(user_id, "client disconnected, abandoning turn");
                return Ok(());
            }
            debug!(user_id, iteration = turn.iteration(), messages = conversation.len(), "opening completion stream");

            let mut deltas = match self.client.stream(conversation.messages(), &tools).await {
                Ok(deltas) => deltas,
                Err(e) => {
                    error!(user_id, provider = self.client.provider_name(), error = %e, "failed to open completion stream");
                    let _ = events.send(ChatEvent::content(CONNECTION_FAILED_MESSAGE)).await;
                    return Ok(());
                }
            };

            while let Some(item) = deltas.recv().await {
                match item {
                    Ok(StreamDelta::Content(fragment)) => {
                        if fragment.is_empty() {
                            continue;
                        }
                        turn.push_content(&fragment);
                        if events.send(ChatEvent::content(fragment)).await.is_err() {
                            info!(user_id, "client disconnected mid-stream");
                            return Ok(());
                        }
                    }
                    Ok(StreamDelta::ToolCallDelta(delta)) => turn.push_tool_delta(delta),
                    Ok(StreamDelta::Done) => break,
                    Err(e) => {
                        error!(user_id, error = %e, "completion stream failed");
                        turn.discard();
                        let _ = events.send(ChatEvent::content(COMPLETION_FAILED_MESSAGE)).await;
                        return Ok(());
                    }
                }
            }
            // Releases the producer and its connection before tools run.
            drop(deltas);

            let reply = turn.take_completion().into();
            match self.step(user_id, Persist::History, &mut conversation, reply).await? {
                Step::Finished(_) => return Ok(()),
                Step::Continue => turn.advance(),
            }
        }

        warn!(user_id, max_iterations = self.config.max_iterations, "iteration cap reached");
        self.history
            .append(user_id, Message::assistant(MAX_ITERATIONS_MESSAGE))
            .await?;
        let _ = events.send(ChatEvent::content(MAX_ITERATIONS_MESSAGE)).await;
        Ok(())
    }

    /// Knowledge-base passages for `query`, formatted for the system prompt.
    /// Greetings skip retrieval; a failing retriever only costs the context.
    async fn knowledge_context(&self, user_id: UserId, query: &str) -> Option<String> {
        if is_simple_greeting(query) {
            return None;
        }
        match self.retriever.retrieve(user_id, query).await {
            Ok(passages) => {
                debug!(user_id, passages = passages.len(), "retrieved knowledge context");
                format_context(&passages)
            }
            Err(e) => {
                warn!(user_id, error = %e, "context retrieval failed, continuing without it");
                None
            }
        }
    }

    /// Act on one model reply: finish with an answer, or run the requested
    /// tools and extend the prompt with their results.
    async fn step(
        &self,
        user_id: UserId,
        persist: Persist,
        conversation: &mut Conversation,
        reply: ModelReply,
    ) -> Result<Step, TurnError> {
        match reply {
            ModelReply::Empty => {
                warn!(user_id, "model returned neither content nor tool calls");
                Ok(Step::Finished(None))
            }
            ModelReply::Answer(content) => {
                self.record(user_id, persist, conversation, Message::assistant(content.as_str()))
                    .await?;
                info!(user_id, chars = content.len(), "turn complete");
                Ok(Step::Finished(Some(content)))
            }
            ModelReply::ToolCalls { content, calls } => {
                info!(user_id, count = calls.len(), tools = %tool_names(&calls), "executing tool calls");
                self.record(
                    user_id,
                    persist,
                    conversation,
                    Message::assistant_tool_calls(content, calls.clone()),
                )
                .await?;

                for result in self.dispatcher.execute_all(&calls, user_id).await {
                    self.record(user_id, persist, conversation, Message::tool_result(&result))
                        .await?;
                }
                Ok(Step::Continue)
            }
        }
    }

    async fn record(
        &self,
        user_id: UserId,
        persist: Persist,
        conversation: &mut Conversation,
        message: Message,
    ) -> Result<(), TurnError> {
        if let Persist::History = persist {
            self.history.append(user_id, message.clone()).await?;
        }
        conversation.push(message);
        Ok(())
    }

    /// The tool catalog advertised on every request.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.dispatcher.definitions()
    }
}

fn tool_names(calls: &[ToolCallRequest]) -> String {
    calls
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("History error: {0}")]
    History(#[from] OikosError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextPassage;
    use crate::conversation::{MessageMetadata, Role};
    use crate::history::InMemoryHistoryStore;
    use crate::provider::mock::MockCompletionClient;
    use crate::provider::{Completion, CompletionError, DeltaReceiver};
    use crate::registry::ToolRegistry;
    use crate::tool::EchoTool;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Harness {
        agent: Arc<AgenticLoop>,
        client: Arc<MockCompletionClient>,
        history: Arc<InMemoryHistoryStore>,
    }

    fn chat_config() -> ChatConfig {
        ChatConfig {
            system_prompt: "You are a test assistant.".to_string(),
            ..ChatConfig::default()
        }
    }

    fn harness() -> Harness {
        harness_with(chat_config(), |agent| agent)
    }

    fn harness_with(config: ChatConfig, configure: impl FnOnce(AgenticLoop) -> AgenticLoop) -> Harness {
        let client = Arc::new(MockCompletionClient::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let agent = AgenticLoop::new(
            client.clone(),
            Arc::new(ToolDispatcher::new(Arc::new(registry))),
            history.clone(),
            config,
        );
        Harness {
            agent: Arc::new(configure(agent)),
            client,
            history,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn stored_roles(history: &InMemoryHistoryStore, user_id: UserId) -> Vec<Role> {
        history
            .recent_messages(user_id, 100)
            .await
            .unwrap()
            .iter()
            .map(|m| m.message.role)
            .collect()
    }

    #[tokio::test]
    async fn test_run_with_tools_plain_answer() {
        let h = harness();
        h.client.queue_text("Hello");

        let out = h.agent.run_with_tools(1, "sys", "Hi").await;
        assert_eq!(out, "Hello");
        assert_eq!(h.client.call_count(), 1);

        let request = &h.client.requests()[0];
        assert!(!request.streaming);
        assert_eq!(request.messages, vec![Message::system("sys"), Message::user("Hi")]);
        assert_eq!(request.tools.len(), 1);
        assert!(h.history.recent_messages(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_with_tools_stops_at_iteration_cap() {
        let h = harness();
        for i in 0..10 {
            h.client
                .queue_tool_call(&format!("call_{i}"), "echo", r#"{"message":"again"}"#);
        }

        let out = h.agent.run_with_tools(1, "sys", "loop forever").await;
        assert_eq!(out, MAX_ITERATIONS_MESSAGE);
        assert_eq!(h.client.call_count(), 5);
    }

    #[tokio::test]
    async fn test_run_with_tools_empty_reply() {
        let h = harness();
        h.client.queue_completion(Completion::default());
        assert_eq!(h.agent.run_with_tools(1, "sys", "Hi").await, "");
        assert_eq!(h.client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_with_tools_feeds_results_back() {
        let h = harness();
        h.client.queue_tool_call("call_1", "echo", r#"{"message":"ping"}"#);
        h.client.queue_text("pong");

        assert_eq!(h.agent.run_with_tools(9, "sys", "ping?").await, "pong");

        let second = &h.client.requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].metadata.tool_calls[0].id, "call_1");
        assert_eq!(second[3].role, Role::Tool);
        assert_eq!(second[3].content.as_deref(), Some("user 9: ping"));
        assert_eq!(second[3].metadata.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_failing_tools_still_answer_each_call() {
        let h = harness();
        h.client.queue_completion(Completion {
            content: None,
            tool_calls: vec![
                ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "launch_rocket".to_string(),
                    arguments: "{}".to_string(),
                },
                ToolCallRequest {
                    id: "call_2".to_string(),
                    name: "echo".to_string(),
                    arguments: "{not json".to_string(),
                },
            ],
        });
        h.client.queue_text("Sorry, I can't do that.");

        let out = h.agent.run_with_tools(1, "sys", "launch").await;
        assert_eq!(out, "Sorry, I can't do that.");
        assert_eq!(h.client.call_count(), 2);

        let second = &h.client.requests()[1].messages;
        let tool_msgs: Vec<_> = second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].content.as_deref(), Some("Unknown tool: launch_rocket"));
        assert_eq!(tool_msgs[0].metadata.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msgs[1]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Invalid arguments for echo"));
    }

    #[tokio::test]
    async fn test_stream_chat_forwards_fragments_and_persists() {
        let h = harness();
        h.client.queue_stream_text(&["Hel", "lo", "!"]);

        let events = collect(h.agent.stream_chat(3, "Hi".to_string())).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::content("Hel"),
                ChatEvent::content("lo"),
                ChatEvent::content("!"),
                ChatEvent::Done,
            ]
        );

        let stored = h.history.recent_messages(3, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].message, Message::user("Hi"));
        assert_eq!(stored[1].message, Message::assistant("Hello!"));

        let request = &h.client.requests()[0];
        assert!(request.streaming);
        assert_eq!(request.messages[0], Message::system("You are a test assistant."));
        assert_eq!(request.messages[1], Message::user("Hi"));
    }

    #[tokio::test]
    async fn test_stream_chat_assembles_and_runs_tool_call() {
        let h = harness();
        h.client
            .queue_stream_tool_call("call_x", "echo", &[r#"{"mess"#, r#"age":"#, r#""hi"}"#]);
        h.client.queue_stream_text(&["Echoed."]);

        let events = collect(h.agent.stream_chat(7, "echo hi".to_string())).await;
        assert_eq!(events, vec![ChatEvent::content("Echoed."), ChatEvent::Done]);

        let stored = h.history.recent_messages(7, 10).await.unwrap();
        let roles: Vec<_> = stored.iter().map(|m| m.message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

        let call = &stored[1].message.metadata.tool_calls[0];
        assert_eq!(call.id, "call_x");
        assert_eq!(call.arguments, r#"{"message":"hi"}"#);
        assert_eq!(stored[1].message.content, None);
        assert_eq!(
            stored[2].message.metadata,
            MessageMetadata {
                tool_calls: Vec::new(),
                tool_call_id: Some("call_x".to_string()),
            }
        );
        assert_eq!(stored[2].message.content.as_deref(), Some("user 7: hi"));
        assert_eq!(h.client.requests()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_stream_open_failure_falls_back_to_apology() {
        let h = harness();
        h.client.queue_stream_failure(CompletionError::Api {
            status: 500,
            body: "internal".to_string(),
        });

        let events = collect(h.agent.stream_chat(1, "Hi".to_string())).await;
        assert_eq!(
            events,
            vec![ChatEvent::content(CONNECTION_FAILED_MESSAGE), ChatEvent::Done]
        );
        assert_eq!(stored_roles(&h.history, 1).await, vec![Role::User]);
    }

    #[tokio::test]
    async fn test_mid_stream_error_discards_iteration() {
        let h = harness();
        h.client.queue_broken_stream(
            vec![StreamDelta::Content("Partial".to_string())],
            CompletionError::Stream("connection reset".to_string()),
        );

        let events = collect(h.agent.stream_chat(1, "Hi".to_string())).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::content("Partial"),
                ChatEvent::content(COMPLETION_FAILED_MESSAGE),
                ChatEvent::Done,
            ]
        );
        assert_eq!(stored_roles(&h.history, 1).await, vec![Role::User]);
    }

    #[tokio::test]
    async fn test_stream_chat_iteration_cap() {
        let h = harness();
        for i in 0..5 {
            h.client
                .queue_stream_tool_call(&format!("call_{i}"), "echo", &[r#"{"message":"x"}"#]);
        }

        let events = collect(h.agent.stream_chat(1, "loop".to_string())).await;
        assert_eq!(h.client.call_count(), 5);
        assert_eq!(
            events,
            vec![ChatEvent::content(MAX_ITERATIONS_MESSAGE), ChatEvent::Done]
        );

        let stored = h.history.recent_messages(1, 100).await.unwrap();
        assert_eq!(stored.len(), 1 + 5 * 2 + 1);
        assert_eq!(
            stored.last().unwrap().message,
            Message::assistant(MAX_ITERATIONS_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_stream_chat_uses_recent_history() {
        let h = harness();
        h.history.append(5, Message::user("My name is Lan")).await.unwrap();
        h.history.append(5, Message::assistant("Hi Lan")).await.unwrap();
        h.client.queue_stream_text(&["Your name is Lan."]);

        collect(h.agent.stream_chat(5, "What's my name?".to_string())).await;
        let messages = &h.client.requests()[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], Message::user("My name is Lan"));
        assert_eq!(messages[3], Message::user("What's my name?"));
    }

    struct BrokenHistory;

    #[async_trait]
    impl HistoryStore for BrokenHistory {
        async fn append_message(
            &self,
            _user_id: UserId,
            _role: Role,
            _content: Option<String>,
            _metadata: MessageMetadata,
        ) -> Result<StoredMessage, OikosError> {
            Err(OikosError::Storage("disk full".to_string()))
        }

        async fn recent_messages(&self, _user_id: UserId, _limit: usize) -> Result<Vec<StoredMessage>, OikosError> {
            Ok(Vec::new())
        }

        async fn clear(&self, _user_id: UserId) -> Result<usize, OikosError> {
            Ok(0)
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl CompletionClient for PanickingClient {
        async fn complete(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Completion {
            panic!("client bug");
        }

        async fn stream(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<DeltaReceiver, CompletionError> {
            panic!("client bug");
        }

        fn provider_name(&self) -> &str {
            "panicking"
        }
    }

    fn expect_error_then_done(events: &[ChatEvent]) {
        assert_eq!(
            events.to_vec(),
            vec![
                ChatEvent::Error {
                    message: TURN_FAILED_MESSAGE.to_string()
                },
                ChatEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_history_failure_reports_error_then_done() {
        let agent = Arc::new(AgenticLoop::new(
            Arc::new(MockCompletionClient::new()),
            Arc::new(ToolDispatcher::new(Arc::new(ToolRegistry::new()))),
            Arc::new(BrokenHistory),
            chat_config(),
        ));
        let events = collect(agent.stream_chat(1, "Hi".to_string())).await;
        expect_error_then_done(&events);
    }

    #[tokio::test]
    async fn test_panic_in_turn_reports_error_then_done() {
        let agent = Arc::new(AgenticLoop::new(
            Arc::new(PanickingClient),
            Arc::new(ToolDispatcher::new(Arc::new(ToolRegistry::new()))),
            Arc::new(InMemoryHistoryStore::new()),
            chat_config(),
        ));
        let events = collect(agent.stream_chat(1, "Hi".to_string())).await;
        expect_error_then_done(&events);
    }

    #[tokio::test]
    async fn test_empty_stream_ends_with_single_done() {
        let h = harness();
        let events = collect(h.agent.stream_chat(1, "Hi".to_string())).await;
        assert_eq!(events, vec![ChatEvent::Done]);
        assert_eq!(stored_roles(&h.history, 1).await, vec![Role::User]);
    }

    #[tokio::test]
    async fn test_clear_history_passthrough() {
        let h = harness();
        h.client.queue_stream_text(&["ok"]);
        collect(h.agent.stream_chat(2, "Hi".to_string())).await;

        assert_eq!(h.agent.history(2, 50).await.unwrap().len(), 2);
        assert_eq!(h.agent.clear_history(2).await.unwrap(), 2);
        assert!(h.agent.history(2, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_max_iterations_overrides_cap() {
        let h = harness_with(chat_config(), |agent| agent.with_max_iterations(2));
        for i in 0..5 {
            h.client
                .queue_tool_call(&format!("call_{i}"), "echo", r#"{"message":"again"}"#);
        }

        assert_eq!(h.agent.run_with_tools(1, "sys", "loop").await, MAX_ITERATIONS_MESSAGE);
        assert_eq!(h.client.call_count(), 2);
    }

    /// Let spawned turn tasks run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_stream_chat_stops_when_client_disconnects_mid_stream() {
        let config = ChatConfig {
            stream_buffer: 1,
            ..chat_config()
        };
        let h = harness_with(config, |agent| agent);
        h.client.queue_stream_text(&["one ", "two ", "three ", "four"]);
        h.client.queue_stream_text(&["never requested"]);

        let mut rx = h.agent.stream_chat(4, "Count to four".to_string());
        assert_eq!(rx.recv().await, Some(ChatEvent::content("one ")));
        drop(rx);
        settle().await;

        assert_eq!(h.client.call_count(), 1);
        assert_eq!(stored_roles(&h.history, 4).await, vec![Role::User]);
    }

    #[tokio::test]
    async fn test_stream_chat_skips_model_when_client_already_gone() {
        let h = harness();
        h.client.queue_stream_text(&["unused"]);

        drop(h.agent.stream_chat(6, "Hi".to_string()));
        settle().await;

        assert_eq!(h.client.call_count(), 0);
        assert_eq!(stored_roles(&h.history, 6).await, vec![Role::User]);
    }

    struct ScriptedRetriever {
        passages: Vec<ContextPassage>,
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedRetriever {
        fn new(passages: Vec<ContextPassage>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                passages,
                fail,
                queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContextRetriever for ScriptedRetriever {
        async fn retrieve(&self, _user_id: UserId, query: &str) -> Result<Vec<ContextPassage>, OikosError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(OikosError::Other("vector store unavailable".to_string()));
            }
            Ok(self.passages.clone())
        }
    }

    fn budgeting_passage() -> ContextPassage {
        ContextPassage {
            content: "Keep needs under half of income.".to_string(),
            source: "budgeting.md".to_string(),
            score: 0.91,
        }
    }

    #[tokio::test]
    async fn test_stream_chat_injects_knowledge_context() {
        let retriever = ScriptedRetriever::new(vec![budgeting_passage()], false);
        let h = harness_with(chat_config(), |agent| agent.with_retriever(retriever.clone()));
        h.client.queue_stream_text(&["Aim for 50%."]);

        let events = collect(h.agent.stream_chat(2, "How should I budget?".to_string())).await;
        assert_eq!(events, vec![ChatEvent::content("Aim for 50%."), ChatEvent::Done]);
        assert_eq!(retriever.queries(), vec!["How should I budget?".to_string()]);

        let system = h.client.requests()[0].messages[0].content.clone().unwrap();
        assert!(system.starts_with("You are a test assistant.\n\nRelevant information from knowledge base:"));
        assert!(system.contains("[Source: budgeting.md, Relevance: 0.91]\nKeep needs under half of income."));
    }

    #[tokio::test]
    async fn test_greeting_skips_context_retrieval() {
        let retriever = ScriptedRetriever::new(vec![budgeting_passage()], false);
        let h = harness_with(chat_config(), |agent| agent.with_retriever(retriever.clone()));
        h.client.queue_stream_text(&["Hi!"]);

        collect(h.agent.stream_chat(2, "Hello there".to_string())).await;
        assert!(retriever.queries().is_empty());
        assert_eq!(
            h.client.requests()[0].messages[0],
            Message::system("You are a test assistant.")
        );
    }

    #[tokio::test]
    async fn test_context_retrieval_failure_does_not_fail_turn() {
        let retriever = ScriptedRetriever::new(Vec::new(), true);
        let h = harness_with(chat_config(), |agent| agent.with_retriever(retriever.clone()));
        h.client.queue_stream_text(&["Still here."]);

        let events = collect(h.agent.stream_chat(2, "What is an emergency fund?".to_string())).await;
        assert_eq!(events, vec![ChatEvent::content("Still here."), ChatEvent::Done]);
        assert_eq!(retriever.queries().len(), 1);
        assert_eq!(
            h.client.requests()[0].messages[0],
            Message::system("You are a test assistant.")
        );
    }
}
