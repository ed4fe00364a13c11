//! TaskerBot: plan, execute, validate, respond
//!
//! ```text
//! user ─▶ Planner ─▶ Executor ─▶ Validator ──accept──▶ Responder ─▶ answer
//!           ▲                        │
//!           └──────── reject ────────┘   (at most max_iterations passes)
//! ```
//!
//! Each step is a trait object so tests and callers can swap any of them.
//! The loop itself is the pure state machine in [`machine`], driven by a
//! private runner that performs the I/O each state asks for.

pub mod machine;
mod executor;
mod observer;
mod planner;
mod responder;
mod runner;
mod validator;

pub use executor::{Executor, RegistryExecutor, DEFAULT_MAX_RETRIES};
pub use machine::{
    transition, ExecutionResult, InvalidTransition, LoopEvent, LoopState, Outcome, Plan,
    ValidationVerdict,
};
pub use observer::{NoopObserver, TracingObserver, TurnObserver};
pub use planner::{parse_plan, LlmPlanner, Planner, PLANNER_TEMPERATURE};
pub use responder::{EchoResponder, LlmResponder, Responder, RESPONDER_TEMPERATURE};
pub use runner::FEEDBACK_PREFIX;
pub use validator::{parse_verdict, HeuristicValidator, LlmValidator, Validator};

use std::sync::Arc;
use tracing::info;

use crate::error::TaskerError;
use crate::llm::{LLMProvider, LLMResponse, LLMResponseStream, TokenUsage};
use crate::prompts::{self, BotProfile};
use crate::response::{commit_on_completion, ResponseModel, ResponseStream};
use crate::state::{ConversationState, HistoryRecord, Message};
use crate::tools::{ToolDefinition, ToolRegistry};
use runner::{LoopRunner, LoopTrace};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// A step's output together with the tokens it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub usage: Option<TokenUsage>,
}

impl<T> Metered<T> {
    pub fn new(value: T) -> Self {
        Self { value, usage: None }
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }
}

/// Conversational agent that plans one tool call at a time and checks each
/// result before answering.
///
/// Only the user message and the final answer of a successful turn are kept
/// in history; tool traffic and validator feedback live for one turn.
///
/// ```rust,ignore
/// let mut registry = ToolRegistry::new();
/// registry.register_all(default_tools());
///
/// let mut bot = TaskerBot::new(llm, BotProfile::new("Book appointments"), registry)
///     .with_max_iterations(3);
/// let response = bot.get_response("Email Ana the invoice").await?;
/// ```
pub struct TaskerBot {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    validator: Arc<dyn Validator>,
    responder: Arc<dyn Responder>,
    observer: Arc<dyn TurnObserver>,
    tools: Vec<ToolDefinition>,
    max_iterations: usize,
    history: Vec<Message>,
}

impl TaskerBot {
    /// Model-backed planner, validator and responder sharing one provider
    pub fn new(llm: Arc<dyn LLMProvider>, profile: BotProfile, registry: ToolRegistry) -> Self {
        Self::with_retries(llm, profile, registry, DEFAULT_MAX_RETRIES)
    }

    pub fn with_retries(
        llm: Arc<dyn LLMProvider>,
        profile: BotProfile,
        registry: ToolRegistry,
        max_retries: usize,
    ) -> Self {
        let rules = prompts::conditional_rules(registry.names());
        let tools = registry.definitions();

        Self::from_parts(
            Arc::new(LlmPlanner::new(llm.clone(), &profile, &rules)),
            Arc::new(RegistryExecutor::new(registry).with_max_retries(max_retries)),
            Arc::new(LlmValidator::new(llm.clone())),
            Arc::new(LlmResponder::new(llm, profile)),
            tools,
        )
    }

    /// Assemble a bot from explicit steps
    pub fn from_parts(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        validator: Arc<dyn Validator>,
        responder: Arc<dyn Responder>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            planner,
            executor,
            validator,
            responder,
            observer: Arc::new(NoopObserver),
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: Vec::new(),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Replace history with externally stored records
    pub fn load_conversation_history(&mut self, records: &[HistoryRecord]) {
        self.history = records.iter().map(Message::from).collect();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one full turn.
    ///
    /// # Errors
    ///
    /// [`TaskerError::RecursionLimit`] when every pass up to `max_iterations`
    /// was rejected, and model errors raised while planning. History is left
    /// untouched on error.
    pub async fn get_response(&mut self, user_text: &str) -> Result<ResponseModel, TaskerError> {
        let (mut state, outcome, trace) = self.run_loop(user_text).await?;

        let content = match outcome {
            Outcome::Fallback(raw) => raw,
            Outcome::Finalized(_) | Outcome::Accepted(_) => {
                let answer = self.responder.respond(&state, &trace.reasoning).await;
                state.record_usage(answer.usage.as_ref());
                answer.value
            }
        };

        self.history.push(Message::user(user_text));
        self.history.push(Message::assistant(&content));

        let mut logs = vec![format!("[USER] {user_text}")];
        logs.extend(trace.logs);
        logs.push("[RESPONDER] Answer generated".to_string());

        Ok(ResponseModel {
            content,
            tool_calls_used: trace.tool_calls,
            token_usage: state.usage().clone(),
            logs,
        })
    }

    /// Run the loop, then stream the final answer.
    ///
    /// The loop itself finishes before this returns; only the responder call
    /// is streamed. History is updated once the stream is exhausted.
    pub async fn get_response_stream<'a>(&'a mut self, user_text: &str) -> Result<ResponseStream<'a>, TaskerError> {
        let (state, outcome, trace) = self.run_loop(user_text).await?;

        let chunks = match outcome {
            Outcome::Fallback(raw) => LLMResponseStream::from_complete(LLMResponse::new(Message::assistant(&raw))),
            Outcome::Finalized(_) | Outcome::Accepted(_) => {
                self.responder.respond_stream(&state, &trace.reasoning).await
            }
        };

        Ok(commit_on_completion(chunks, Message::user(user_text), &mut self.history))
    }

    async fn run_loop(&self, user_text: &str) -> Result<(ConversationState, Outcome, LoopTrace), TaskerError> {
        let mut state = ConversationState::with_messages(self.history.clone());
        state.push(Message::user(user_text));
        info!(history = self.history.len(), max_iterations = self.max_iterations, "TaskerBot turn");

        let runner = LoopRunner {
            planner: self.planner.as_ref(),
            executor: self.executor.as_ref(),
            validator: self.validator.as_ref(),
            observer: self.observer.as_ref(),
            tools: &self.tools,
            max_iterations: self.max_iterations,
        };
        let (outcome, trace) = runner.run(&mut state).await?;
        Ok((state, outcome, trace))
    }
}

impl std::fmt::Debug for TaskerBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskerBot")
            .field("tools", &self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("max_iterations", &self.max_iterations)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}
