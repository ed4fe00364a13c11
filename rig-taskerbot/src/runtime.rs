// src/runtime.rs
//! Per-invocation context handed to tools

/// Context of one tool invocation.
///
/// Tools receive this alongside their arguments; it identifies the call for
/// tracing and tells the tool whether it is being retried.
#[derive(Debug, Clone, Default)]
pub struct ToolRuntime {
    tool_call_id: Option<String>,
    iteration: usize,
    attempt: usize,
}

impl ToolRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool_call_id(mut self, id: &str) -> Self {
        self.tool_call_id = Some(id.to_string());
        self
    }

    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_attempt(mut self, attempt: usize) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    /// Planning pass that requested the call (1-based, 0 outside a tasker loop)
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Zero for the first attempt, incremented on every retry
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}
