//! Validation step: accept a tool result or send the planner back with feedback

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::machine::{ExecutionResult, ValidationVerdict};
use super::Metered;
use crate::error::TaskerError;
use crate::extract;
use crate::llm::{LLMConfig, LLMProvider};
use crate::prompts;
use crate::state::Message;

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        task: &str,
        result: &ExecutionResult,
    ) -> Result<Metered<ValidationVerdict>, TaskerError>;
}

/// Rule-based checks, no model calls.
///
/// Rejects failed results and empty output. With required fields set, the
/// result's structured data (or its output parsed as JSON) must carry each one.
#[derive(Debug, Clone, Default)]
pub struct HeuristicValidator {
    required_fields: Vec<String>,
}

impl HeuristicValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn check(&self, result: &ExecutionResult) -> ValidationVerdict {
        if !result.success {
            let error = result.error.as_deref().unwrap_or("unknown error");
            return ValidationVerdict::reject(format!(
                "Tool '{}' failed: {error}. Fix the arguments or choose a different approach.",
                result.tool_name
            ));
        }

        if result.output.trim().is_empty() {
            return ValidationVerdict::reject(format!(
                "Tool '{}' returned no output.",
                result.tool_name
            ));
        }

        if self.required_fields.is_empty() {
            return ValidationVerdict::Accept;
        }

        let payload = result
            .data
            .clone()
            .or_else(|| serde_json::from_str::<Value>(&result.output).ok());
        let missing: Vec<&str> = self
            .required_fields
            .iter()
            .map(String::as_str)
            .filter(|field| payload.as_ref().and_then(|p| p.get(field)).is_none())
            .collect();

        if missing.is_empty() {
            ValidationVerdict::Accept
        } else {
            ValidationVerdict::reject(format!(
                "Tool '{}' output is missing: {}.",
                result.tool_name,
                missing.join(", ")
            ))
        }
    }
}

#[async_trait]
impl Validator for HeuristicValidator {
    async fn validate(
        &self,
        _task: &str,
        result: &ExecutionResult,
    ) -> Result<Metered<ValidationVerdict>, TaskerError> {
        Ok(Metered::new(self.check(result)))
    }
}

/// Asks the model to review the result.
///
/// Failed results are rejected without a model call. A reply without a
/// readable `Status:` line, or a failed call, falls back to the heuristic.
pub struct LlmValidator {
    llm: Arc<dyn LLMProvider>,
    config: LLMConfig,
    fallback: HeuristicValidator,
}

impl LlmValidator {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        let config = LLMConfig::new(llm.default_model()).with_temperature(0.0);
        Self {
            llm,
            config,
            fallback: HeuristicValidator::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: HeuristicValidator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Validator for LlmValidator {
    async fn validate(
        &self,
        task: &str,
        result: &ExecutionResult,
    ) -> Result<Metered<ValidationVerdict>, TaskerError> {
        let baseline = self.fallback.check(result);
        if !result.success {
            return Ok(Metered::new(baseline));
        }

        let prompt = prompts::validator_prompt(
            task,
            &result.tool_name,
            &result.arguments.to_string(),
            &result.output,
        );
        let response = match self
            .llm
            .complete(&[Message::user(&prompt)], &[], Some(&self.config))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Validator call failed, using heuristic verdict");
                return Ok(Metered::new(baseline));
            }
        };

        let verdict = parse_verdict(&response.message.content).unwrap_or_else(|| {
            debug!(reply = %response.message.content, "Unreadable validator reply");
            baseline
        });
        Ok(Metered::new(verdict).with_usage(response.usage))
    }
}

/// Read `Status:` / `Feedback:` lines; `None` when the status is missing or unknown
pub fn parse_verdict(reply: &str) -> Option<ValidationVerdict> {
    let status = extract::labelled_line(reply, "status")?.to_lowercase();
    let feedback = extract::labelled_line(reply, "feedback").unwrap_or_default();

    match status.as_str() {
        "approved" | "approve" | "accepted" | "accept" => Some(ValidationVerdict::Accept),
        "rejected" | "reject" => Some(ValidationVerdict::reject(if feedback.is_empty() {
            "The result does not satisfy the request."
        } else {
            feedback
        })),
        _ => None,
    }
}
