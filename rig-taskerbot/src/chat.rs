//! ChatBot: single-agent tool-calling bot
//!
//! The model answers directly and may call tools along the way; there is no
//! separate planner or validator. Each model call sees the system prompt,
//! the stored history and everything produced so far in the turn.
//!
//! With an [`Embedder`] attached, text passed to
//! [`process_file`](ChatBot::process_file) is indexed and the chunks closest
//! to each user message are added to the system prompt.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::documents::{DocumentIndex, Embedder, DEFAULT_TOP_K};
use crate::error::TaskerError;
use crate::llm::{LLMConfig, LLMProvider};
use crate::prompts::{self, APOLOGY};
use crate::response::{commit_on_completion, ResponseModel, ResponseStream, ToolCallRecord, ToolCallStatus};
use crate::runtime::ToolRuntime;
use crate::state::{ConversationState, HistoryRecord, Message, Role, ToolCall};
use crate::tasker::{NoopObserver, TurnObserver};
use crate::tools::{validate_arguments, ToolRegistry};

pub const DEFAULT_CHAT_MAX_ITERATIONS: usize = 10;

pub struct ChatBot {
    llm: Arc<dyn LLMProvider>,
    registry: ToolRegistry,
    instructions: String,
    context: Option<String>,
    config: Option<LLMConfig>,
    observer: Arc<dyn TurnObserver>,
    max_iterations: usize,
    history: Vec<Message>,
    documents: Option<DocumentIndex>,
}

impl ChatBot {
    pub fn new(llm: Arc<dyn LLMProvider>, registry: ToolRegistry, instructions: impl Into<String>) -> Self {
        Self {
            llm,
            registry,
            instructions: instructions.into(),
            context: None,
            config: None,
            observer: Arc::new(NoopObserver),
            max_iterations: DEFAULT_CHAT_MAX_ITERATIONS,
            history: Vec::new(),
            documents: None,
        }
    }

    /// Deployment facts appended to the system prompt
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Maximum model calls per turn
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enable [`process_file`](Self::process_file) with an empty index
    pub fn with_embedder(self, embedder: Arc<dyn Embedder>) -> Self {
        self.with_documents(DocumentIndex::new(embedder))
    }

    pub fn with_documents(mut self, index: DocumentIndex) -> Self {
        self.documents = Some(index);
        self
    }

    pub fn documents(&self) -> Option<&DocumentIndex> {
        self.documents.as_ref()
    }

    /// Index the text of an uploaded file for later turns.
    ///
    /// Returns the number of chunks added; fails with
    /// [`TaskerError::Config`] when no embedder is attached.
    pub async fn process_file(&mut self, text: &str) -> Result<usize, TaskerError> {
        let index = self
            .documents
            .as_mut()
            .ok_or_else(|| TaskerError::Config("no embedder attached, cannot index files".into()))?;
        let added = index.add_text(text).await?;
        info!(chunks = added, total = index.len(), "File processed");
        Ok(added)
    }

    pub fn system_prompt(&self) -> String {
        let rules = prompts::conditional_rules(self.registry.names());
        prompts::chat_system_prompt(&self.instructions, &rules, self.context.as_deref())
    }

    /// System prompt plus the indexed chunks closest to `user_text`.
    ///
    /// A failed lookup is logged and the turn goes on without file context.
    async fn turn_system_prompt(&self, user_text: &str) -> String {
        let prompt = self.system_prompt();
        let Some(index) = self.documents.as_ref().filter(|i| !i.is_empty()) else {
            return prompt;
        };

        match index.context_for(user_text, DEFAULT_TOP_K).await {
            Ok(context) => prompts::with_file_context(prompt, &context),
            Err(e) => {
                warn!(error = %e, "Document lookup failed");
                prompt
            }
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    pub fn load_conversation_history(&mut self, records: &[HistoryRecord]) {
        self.history = records.iter().map(Message::from).collect();
    }

    /// Forget the conversation and every processed file
    pub fn clear_memory(&mut self) {
        self.history.clear();
        if let Some(index) = self.documents.as_mut() {
            index.clear();
        }
    }

    /// Run one turn, calling tools until the model answers in plain text.
    ///
    /// A failed model call yields the apology answer and leaves history as it
    /// was. More than `max_iterations` model calls is a
    /// [`TaskerError::RecursionLimit`].
    pub async fn get_response(&mut self, user_text: &str) -> Result<ResponseModel, TaskerError> {
        let mut state = ConversationState::with_messages(self.history.clone());
        let turn_start = state.len();
        state.push(Message::user(user_text));

        let system = Message::system(&self.turn_system_prompt(user_text).await);
        let tools = self.registry.definitions();
        let mut tool_calls_used = Vec::new();

        info!(history = self.history.len(), tools = tools.len(), "ChatBot turn");

        loop {
            if state.advance_iteration() > self.max_iterations {
                warn!(limit = self.max_iterations, "Recursion limit reached");
                return Err(TaskerError::RecursionLimit { limit: self.max_iterations });
            }

            let mut request = Vec::with_capacity(state.len() + 1);
            request.push(system.clone());
            request.extend(state.messages().iter().cloned());

            let response = match self.llm.complete(&request, &tools, self.config.as_ref()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Model call failed");
                    let mut fallback = ResponseModel::new(APOLOGY);
                    fallback.token_usage = state.usage().clone();
                    fallback.tool_calls_used = tool_calls_used;
                    return Ok(fallback);
                }
            };
            state.record_usage(response.usage.as_ref());

            let calls = response.message.tool_calls.clone().unwrap_or_default();
            state.push(response.message);
            if calls.is_empty() {
                break;
            }

            for call in &calls {
                let record = self.run_tool(call, state.iteration()).await;
                let tag = match record.status {
                    ToolCallStatus::Success => "success",
                    ToolCallStatus::Failed => "error",
                };
                state.push(Message::tool_with_status(&record.output, &call.id, tag));
                tool_calls_used.push(record);
            }
        }

        let messages = state.messages();
        let content = messages[turn_start..]
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let logs = turn_logs(&messages[turn_start..]);
        let token_usage = state.usage().clone();

        self.history = state.into_messages();

        Ok(ResponseModel {
            content,
            tool_calls_used,
            token_usage,
            logs,
        })
    }

    /// Stream the answer of a single model call.
    ///
    /// Tools are not offered on this path. The user message and the answer
    /// are added to history once the stream is exhausted, and only if text
    /// came back.
    pub async fn get_response_stream<'a>(&'a mut self, user_text: &str) -> Result<ResponseStream<'a>, TaskerError> {
        let user = Message::user(user_text);
        let mut request = Vec::with_capacity(self.history.len() + 2);
        request.push(Message::system(&self.turn_system_prompt(user_text).await));
        request.extend(self.history.iter().cloned());
        request.push(user.clone());

        let chunks = self.llm.stream(&request, &[], self.config.as_ref()).await?;
        Ok(commit_on_completion(chunks, user, &mut self.history))
    }

    async fn run_tool(&self, call: &ToolCall, iteration: usize) -> ToolCallRecord {
        self.observer.on_tool_start(&call.name, &call.arguments);

        let outcome = match self.registry.get(&call.name) {
            None => Err(format!("Unknown tool: {}", call.name)),
            Some(tool) => {
                let runtime = ToolRuntime::new()
                    .with_tool_call_id(&call.id)
                    .with_iteration(iteration);
                let executed = match validate_arguments(&tool.definition().parameters, &call.arguments) {
                    Ok(()) => tool.execute(call.arguments.clone(), &runtime).await,
                    Err(e) => Err(e),
                };
                executed
                    .map(|result| result.message)
                    .map_err(|e| format!("Tool error: {e}"))
            }
        };

        let (output, status) = match outcome {
            Ok(output) => {
                self.observer.on_tool_end(&call.name, &output);
                (output, ToolCallStatus::Success)
            }
            Err(error) => {
                self.observer.on_tool_error(&call.name, &error);
                (error, ToolCallStatus::Failed)
            }
        };
        debug!(tool = %call.name, ?status, "Tool finished");

        ToolCallRecord {
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            output,
            status,
        }
    }
}

fn turn_logs(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(format!("[USER] {}", m.content)),
            Role::Assistant if m.has_tool_calls() => {
                let names: Vec<&str> = m.tool_calls.iter().flatten().map(|c| c.name.as_str()).collect();
                Some(format!("[AGENT] Tool calls: {names:?}"))
            }
            Role::Assistant if !m.content.is_empty() => Some("[AGENT] Response generated".to_string()),
            Role::Tool => Some("[TOOL] Result received".to_string()),
            _ => None,
        })
        .collect()
}

impl std::fmt::Debug for ChatBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBot")
            .field("provider", &self.llm.name())
            .field("tools", &self.registry.names())
            .field("max_iterations", &self.max_iterations)
            .field("history", &self.history.len())
            .field("documents", &self.documents.as_ref().map(DocumentIndex::len))
            .finish_non_exhaustive()
    }
}
