// src/error.rs
//! Error types for bots, tools and the classifier

use thiserror::Error;

/// Failure raised from inside a tool body.
///
/// The tasker executor never lets this escape a turn: it is caught and turned
/// into a failed `ExecutionResult`.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution error: {0}")]
    Execution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Top-level error for bots and the classifier
#[derive(Error, Debug)]
pub enum TaskerError {
    /// The planner could not map model output to a tool call or a final answer
    #[error("Could not parse a plan from model output: {raw:?}")]
    PlanParse { raw: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Recursion limit of {limit} iterations reached")]
    RecursionLimit { limit: usize },

    #[error(transparent)]
    InvalidTransition(#[from] crate::tasker::InvalidTransition),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskerError {
    /// Raw model text carried by a plan-parse failure
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            TaskerError::PlanParse { raw } => Some(raw),
            _ => None,
        }
    }
}
