//! Plan / execute / validate state machine
//!
//! ```text
//!  Start ──Begin──▶ Planning(i) ──Planned(CallTool)──▶ Executing(i) ──Executed──▶ Validating(i)
//!                     │   ▲                                                          │
//!                     │   └───────────── Verdict(Reject), i < max ─── Planning(i+1) ◀┤
//!                     │                                                              │
//!   Planned(Finalize) │ PlanUnparseable                 Verdict(Accept)              │ Verdict(Reject), i >= max
//!                     ▼                                       ▼                      ▼
//!                   Done ◀────────────────────────────────── Done                 Aborted
//! ```
//!
//! [`transition`] is pure: it owns no I/O and no clock, so every branch of the
//! loop can be tested by feeding events by hand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ToolCall;

/// Next action proposed by the planner
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    CallTool { call: ToolCall, reasoning: String },
    Finalize(String),
}

impl Plan {
    pub fn decision(&self) -> &'static str {
        match self {
            Plan::CallTool { .. } => "execute_tool",
            Plan::Finalize(_) => "finish",
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Plan::CallTool { call, .. } => Some(&call.name),
            Plan::Finalize(_) => None,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            Plan::CallTool { reasoning, .. } => reasoning,
            Plan::Finalize(text) => text,
        }
    }
}

/// What happened when a tool ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool_name: String,
    pub tool_call_id: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    /// Tool output; empty on failure
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn success(call: &ToolCall, output: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
            arguments: call.arguments.clone(),
            success: true,
            output: output.into(),
            error: None,
            data,
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
            arguments: call.arguments.clone(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            data: None,
        }
    }

    /// Text fed back to the model as the tool message
    pub fn observation(&self) -> String {
        match (&self.error, self.success) {
            (Some(error), false) => format!("ERROR: {error}"),
            (None, false) => "ERROR: tool failed".to_string(),
            _ => self.output.clone(),
        }
    }

    pub fn status(&self) -> &'static str {
        if self.success {
            "success"
        } else {
            "failed"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accept,
    Reject { feedback: String },
}

impl ValidationVerdict {
    pub fn reject(feedback: impl Into<String>) -> Self {
        ValidationVerdict::Reject { feedback: feedback.into() }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, ValidationVerdict::Accept)
    }
}

/// How a loop reached `Done`
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The planner answered without (further) tools
    Finalized(String),
    /// The validator accepted a tool result
    Accepted(ExecutionResult),
    /// The planner's output could not be parsed; its raw text is the answer
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Start,
    Planning { iteration: usize },
    Executing { iteration: usize, call: ToolCall },
    Validating { iteration: usize, result: ExecutionResult },
    Done(Outcome),
    Aborted { iterations: usize },
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Start => "start",
            LoopState::Planning { .. } => "planning",
            LoopState::Executing { .. } => "executing",
            LoopState::Validating { .. } => "validating",
            LoopState::Done(_) => "done",
            LoopState::Aborted { .. } => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done(_) | LoopState::Aborted { .. })
    }

    /// Planning pass this state belongs to; zero before the first pass
    pub fn iteration(&self) -> usize {
        match self {
            LoopState::Planning { iteration }
            | LoopState::Executing { iteration, .. }
            | LoopState::Validating { iteration, .. } => *iteration,
            LoopState::Aborted { iterations } => *iterations,
            LoopState::Start | LoopState::Done(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    Begin,
    Planned(Plan),
    PlanUnparseable { raw: String },
    Executed(ExecutionResult),
    Verdict(ValidationVerdict),
}

impl LoopEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LoopEvent::Begin => "begin",
            LoopEvent::Planned(_) => "planned",
            LoopEvent::PlanUnparseable { .. } => "plan_unparseable",
            LoopEvent::Executed(_) => "executed",
            LoopEvent::Verdict(_) => "verdict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid loop transition: event '{event}' in state '{state}'")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

/// Advance the loop by one event.
///
/// A reject verdict in pass `max_iterations` aborts instead of planning
/// again, so at most `max_iterations` plan/execute cycles ever run. With
/// `max_iterations == 0` the loop aborts before planning.
pub fn transition(
    state: LoopState,
    event: LoopEvent,
    max_iterations: usize,
) -> Result<LoopState, InvalidTransition> {
    let next = match (state, event) {
        (LoopState::Start, LoopEvent::Begin) if max_iterations == 0 => {
            LoopState::Aborted { iterations: 0 }
        }
        (LoopState::Start, LoopEvent::Begin) => LoopState::Planning { iteration: 1 },

        (LoopState::Planning { iteration }, LoopEvent::Planned(Plan::CallTool { call, .. })) => {
            LoopState::Executing { iteration, call }
        }
        (LoopState::Planning { .. }, LoopEvent::Planned(Plan::Finalize(answer))) => {
            LoopState::Done(Outcome::Finalized(answer))
        }
        (LoopState::Planning { .. }, LoopEvent::PlanUnparseable { raw }) => {
            LoopState::Done(Outcome::Fallback(raw))
        }

        (LoopState::Executing { iteration, .. }, LoopEvent::Executed(result)) => {
            LoopState::Validating { iteration, result }
        }

        (LoopState::Validating { result, .. }, LoopEvent::Verdict(ValidationVerdict::Accept)) => {
            LoopState::Done(Outcome::Accepted(result))
        }
        (LoopState::Validating { iteration, .. }, LoopEvent::Verdict(ValidationVerdict::Reject { .. })) => {
            if iteration >= max_iterations {
                LoopState::Aborted { iterations: iteration }
            } else {
                LoopState::Planning { iteration: iteration + 1 }
            }
        }

        (state, event) => {
            return Err(InvalidTransition {
                state: state.name(),
                event: event.name(),
            })
        }
    };
    Ok(next)
}
