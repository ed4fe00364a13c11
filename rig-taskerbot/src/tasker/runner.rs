//! Drives the state machine, performing the I/O each state asks for

use tracing::{debug, info, warn};

use super::executor::Executor;
use super::machine::{
    transition, ExecutionResult, InvalidTransition, LoopEvent, LoopState, Outcome, Plan, ValidationVerdict,
};
use super::observer::TurnObserver;
use super::planner::Planner;
use super::validator::Validator;
use crate::error::TaskerError;
use crate::response::{ToolCallRecord, ToolCallStatus};
use crate::runtime::ToolRuntime;
use crate::state::{ConversationState, Message};
use crate::tools::ToolDefinition;

/// Prefix of the message a rejected result leaves for the next planning pass
pub const FEEDBACK_PREFIX: &str = "Validation feedback: ";

/// What happened on the way to `Done`
#[derive(Debug, Default)]
pub(crate) struct LoopTrace {
    /// Reasoning attached to the latest plan
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub logs: Vec<String>,
}

impl LoopTrace {
    fn log(&mut self, line: String) {
        debug!(%line, "Turn log");
        self.logs.push(line);
    }
}

pub(crate) struct LoopRunner<'a> {
    pub planner: &'a dyn Planner,
    pub executor: &'a dyn Executor,
    pub validator: &'a dyn Validator,
    pub observer: &'a dyn TurnObserver,
    pub tools: &'a [ToolDefinition],
    pub max_iterations: usize,
}

impl LoopRunner<'_> {
    /// Run one turn's loop over `state`, whose last user message is the task.
    ///
    /// Returns [`TaskerError::RecursionLimit`] when the validator is still
    /// rejecting after `max_iterations` passes.
    pub async fn run(&self, state: &mut ConversationState) -> Result<(Outcome, LoopTrace), TaskerError> {
        let task = state
            .last_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let mut trace = LoopTrace::default();
        let mut current = transition(LoopState::Start, LoopEvent::Begin, self.max_iterations)?;

        while !current.is_terminal() {
            let event = match &current {
                LoopState::Planning { iteration } => {
                    let pass = state.advance_iteration();
                    debug_assert_eq!(pass, *iteration);
                    self.plan(*iteration, state, &mut trace).await?
                }
                LoopState::Executing { iteration, call } => {
                    state.push(Message::assistant_with_tool_calls(&trace.reasoning, vec![call.clone()]));
                    self.observer.on_tool_start(&call.name, &call.arguments);

                    let runtime = ToolRuntime::new()
                        .with_tool_call_id(&call.id)
                        .with_iteration(*iteration);
                    let result = match self.executor.execute(call, &runtime).await {
                        Ok(result) => result,
                        Err(TaskerError::UnknownTool(name)) => {
                            warn!(tool = %name, "Planner asked for an unknown tool");
                            ExecutionResult::failure(call, format!("Tool {name} not found"))
                        }
                        Err(e) => return Err(e),
                    };

                    self.record_execution(&result, state, &mut trace);
                    LoopEvent::Executed(result)
                }
                LoopState::Validating { iteration, result } => {
                    let verdict = self.validator.validate(&task, result).await?;
                    state.record_usage(verdict.usage.as_ref());

                    match &verdict.value {
                        ValidationVerdict::Accept => {
                            trace.log(format!("[VALIDATOR] Iteration {iteration}: approved {}", result.tool_name));
                        }
                        ValidationVerdict::Reject { feedback } => {
                            trace.log(format!("[VALIDATOR] Iteration {iteration}: rejected ({feedback})"));
                            state.push(Message::system(&format!("{FEEDBACK_PREFIX}{feedback}")));
                        }
                    }
                    LoopEvent::Verdict(verdict.value)
                }
                LoopState::Start | LoopState::Done(_) | LoopState::Aborted { .. } => {
                    return Err(InvalidTransition { state: current.name(), event: "step" }.into());
                }
            };

            current = transition(current, event, self.max_iterations)?;
        }

        match current {
            LoopState::Done(outcome) => Ok((outcome, trace)),
            LoopState::Aborted { iterations } => {
                warn!(iterations, limit = self.max_iterations, "Recursion limit reached");
                Err(TaskerError::RecursionLimit { limit: self.max_iterations })
            }
            other => Err(InvalidTransition { state: other.name(), event: "finish" }.into()),
        }
    }

    async fn plan(
        &self,
        iteration: usize,
        state: &mut ConversationState,
        trace: &mut LoopTrace,
    ) -> Result<LoopEvent, TaskerError> {
        info!(iteration, "Planning");
        match self.planner.plan(state, self.tools).await {
            Ok(planned) => {
                state.record_usage(planned.usage.as_ref());
                let plan = planned.value;
                self.observer.on_plan(iteration, &plan);

                let target = plan.tool_name().map(|t| format!(" {t}")).unwrap_or_default();
                trace.log(format!("[PLANNER] Iteration {iteration}: {}{target}", plan.decision()));
                trace.reasoning = plan.reasoning().to_string();
                Ok(LoopEvent::Planned(plan))
            }
            Err(TaskerError::PlanParse { raw }) if raw.trim().is_empty() => {
                warn!(iteration, "Empty plan, handing over to the responder");
                trace.log(format!("[PLANNER] Iteration {iteration}: finish"));
                Ok(LoopEvent::Planned(Plan::Finalize(String::new())))
            }
            Err(TaskerError::PlanParse { raw }) => {
                warn!(iteration, "Unparseable plan, answering with raw model text");
                trace.log(format!("[PLANNER] Iteration {iteration}: unparseable output"));
                Ok(LoopEvent::PlanUnparseable { raw })
            }
            Err(e) => Err(e),
        }
    }

    fn record_execution(&self, result: &ExecutionResult, state: &mut ConversationState, trace: &mut LoopTrace) {
        let status = if result.success {
            self.observer.on_tool_end(&result.tool_name, &result.output);
            trace.log(format!("[EXECUTOR] Tool '{}' completed", result.tool_name));
            ToolCallStatus::Success
        } else {
            let error = result.error.as_deref().unwrap_or_default();
            self.observer.on_tool_error(&result.tool_name, error);
            trace.log(format!("[EXECUTOR] Tool '{}' failed: {error}", result.tool_name));
            ToolCallStatus::Failed
        };

        let observation = result.observation();
        let tag = match status {
            ToolCallStatus::Success => "success",
            ToolCallStatus::Failed => "error",
        };
        state.push(Message::tool_with_status(&observation, &result.tool_call_id, tag));

        trace.tool_calls.push(ToolCallRecord {
            tool_name: result.tool_name.clone(),
            args: result.arguments.clone(),
            output: observation,
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasker::observer::NoopObserver;
    use crate::tasker::validator::HeuristicValidator;
    use crate::tasker::Metered;
    use crate::state::{Role, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out queued plans; finalizes once the queue is empty
    struct QueuedPlanner(Mutex<VecDeque<Result<Plan, TaskerError>>>);

    impl QueuedPlanner {
        fn new(plans: Vec<Result<Plan, TaskerError>>) -> Self {
            Self(Mutex::new(plans.into()))
        }
    }

    #[async_trait]
    impl Planner for QueuedPlanner {
        async fn plan(&self, _state: &ConversationState, _tools: &[ToolDefinition]) -> Result<Metered<Plan>, TaskerError> {
            let next = self.0.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Plan::Finalize("done".into()))).map(Metered::new)
        }
    }

    /// Succeeds for every tool except `missing`
    struct StubExecutor;

    #[async_trait]
    impl Executor for StubExecutor {
        async fn execute(&self, call: &ToolCall, runtime: &ToolRuntime) -> Result<ExecutionResult, TaskerError> {
            if call.name == "missing" {
                return Err(TaskerError::UnknownTool(call.name.clone()));
            }
            Ok(ExecutionResult::success(call, format!("ran in pass {}", runtime.iteration()), None))
        }
    }

    fn tool_plan(name: &str) -> Result<Plan, TaskerError> {
        Ok(Plan::CallTool {
            call: ToolCall::new(name, json!({})),
            reasoning: format!("use {name}"),
        })
    }

    fn seeded() -> ConversationState {
        let mut state = ConversationState::new();
        state.push(Message::user("do the thing"));
        state
    }

    async fn run(planner: QueuedPlanner, max_iterations: usize, state: &mut ConversationState) -> Result<(Outcome, LoopTrace), TaskerError> {
        LoopRunner {
            planner: &planner,
            executor: &StubExecutor,
            validator: &HeuristicValidator::new(),
            observer: &NoopObserver,
            tools: &[],
            max_iterations,
        }
        .run(state)
        .await
    }

    #[tokio::test]
    async fn test_accepted_tool_call_leaves_call_and_result_in_state() {
        let mut state = seeded();
        let (outcome, trace) = run(QueuedPlanner::new(vec![tool_plan("echo")]), 3, &mut state).await.unwrap();

        assert!(matches!(outcome, Outcome::Accepted(ref r) if r.output == "ran in pass 1"));
        assert_eq!(trace.reasoning, "use echo");
        assert_eq!(trace.tool_calls.len(), 1);

        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(state.iteration(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back_then_limit_hit() {
        let mut state = seeded();
        let planner = QueuedPlanner::new(vec![tool_plan("missing"), tool_plan("missing")]);

        let err = run(planner, 2, &mut state).await.unwrap_err();

        assert!(matches!(err, TaskerError::RecursionLimit { limit: 2 }));
        assert_eq!(state.iteration(), 2);
        let tool_outputs: Vec<&str> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tool_outputs, vec!["ERROR: Tool missing not found"; 2]);
        assert!(state
            .messages()
            .iter()
            .any(|m| m.role == Role::System && m.content.starts_with(FEEDBACK_PREFIX)));
    }

    #[tokio::test]
    async fn test_replans_after_rejection_then_finalizes() {
        let mut state = seeded();
        let planner = QueuedPlanner::new(vec![tool_plan("missing"), Ok(Plan::Finalize("cannot do it".into()))]);

        let (outcome, trace) = run(planner, 5, &mut state).await.unwrap();

        assert_eq!(outcome, Outcome::Finalized("cannot do it".into()));
        assert_eq!(trace.tool_calls[0].status, ToolCallStatus::Failed);
        assert_eq!(state.iteration(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_plan_falls_back() {
        let mut state = seeded();
        let planner = QueuedPlanner::new(vec![Err(TaskerError::PlanParse { raw: "{\"x\": 1}".into() })]);

        let (outcome, _) = run(planner, 3, &mut state).await.unwrap();
        assert_eq!(outcome, Outcome::Fallback("{\"x\": 1}".into()));
    }

    #[tokio::test]
    async fn test_blank_unparseable_plan_finalizes() {
        let mut state = seeded();
        let planner = QueuedPlanner::new(vec![Err(TaskerError::PlanParse { raw: "  ".into() })]);

        let (outcome, _) = run(planner, 3, &mut state).await.unwrap();
        assert_eq!(outcome, Outcome::Finalized(String::new()));
    }

    #[tokio::test]
    async fn test_model_errors_propagate() {
        let mut state = seeded();
        let planner = QueuedPlanner::new(vec![Err(TaskerError::LlmError("quota".into()))]);

        let err = run(planner, 3, &mut state).await.unwrap_err();
        assert!(matches!(err, TaskerError::LlmError(_)));
    }
}
