//! Planning step: decide the next tool call or finish

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::machine::Plan;
use super::Metered;
use crate::error::TaskerError;
use crate::extract;
use crate::llm::{LLMConfig, LLMProvider};
use crate::prompts::{self, BotProfile};
use crate::state::{ConversationState, Message, ToolCall};
use crate::tools::ToolDefinition;

pub const PLANNER_TEMPERATURE: f64 = 0.1;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Propose the next action.
    ///
    /// Output that maps to neither a tool call nor an answer is reported as
    /// [`TaskerError::PlanParse`] carrying the raw model text.
    async fn plan(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<Metered<Plan>, TaskerError>;
}

/// Planner backed by a language model
pub struct LlmPlanner {
    llm: Arc<dyn LLMProvider>,
    system_prompt: String,
    config: LLMConfig,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LLMProvider>, profile: &BotProfile, rules: &str) -> Self {
        let config = LLMConfig::new(llm.default_model()).with_temperature(PLANNER_TEMPERATURE);
        Self {
            llm,
            system_prompt: prompts::planner_system_prompt(profile, rules),
            config,
        }
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<Metered<Plan>, TaskerError> {
        let mut messages = Vec::with_capacity(state.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(state.messages().iter().cloned());
        messages.push(Message::user(&prompts::planner_analysis_input(state)));

        let response = self.llm.complete(&messages, tools, Some(&self.config)).await?;
        let plan = parse_plan(&response.message)?;
        debug!(decision = plan.decision(), tool = ?plan.tool_name(), "Planner decided");

        Ok(Metered::new(plan).with_usage(response.usage))
    }
}

/// Map a model reply to a [`Plan`].
///
/// In order: the first native tool call; a JSON action object
/// (`{"tool": ..., "arguments": ...}` or `{"final_answer": ...}`); any other
/// text as the final answer. An empty reply finishes with empty reasoning,
/// leaving the answer to the responder.
pub fn parse_plan(message: &Message) -> Result<Plan, TaskerError> {
    let reasoning = message.content.trim();

    if let Some(call) = message.tool_calls.iter().flatten().next() {
        return Ok(Plan::CallTool {
            call: call.clone(),
            reasoning: reasoning.to_string(),
        });
    }

    if reasoning.is_empty() {
        return Ok(Plan::Finalize(String::new()));
    }

    let Some(action) = extract::json_object(reasoning) else {
        return Ok(Plan::Finalize(reasoning.to_string()));
    };

    if let Some(name) = action.get("tool").and_then(Value::as_str) {
        let arguments = action
            .get("arguments")
            .or_else(|| action.get("params"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let why = action
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Ok(Plan::CallTool {
            call: ToolCall::new(name, arguments),
            reasoning: why.to_string(),
        });
    }

    match action.get("final_answer").and_then(Value::as_str) {
        Some(answer) if !answer.trim().is_empty() => Ok(Plan::Finalize(answer.trim().to_string())),
        _ => Err(TaskerError::PlanParse { raw: message.content.clone() }),
    }
}
