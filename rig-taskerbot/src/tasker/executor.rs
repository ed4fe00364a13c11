//! Execution step: run the planned tool call

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use super::machine::ExecutionResult;
use crate::error::{TaskerError, ToolError};
use crate::runtime::ToolRuntime;
use crate::state::ToolCall;
use crate::tools::{validate_arguments, ToolRegistry};

pub const DEFAULT_MAX_RETRIES: usize = 2;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one tool call.
    ///
    /// Tool failures come back as `Ok` with `success == false`. Only a call
    /// naming a tool that does not exist is an `Err` ([`TaskerError::UnknownTool`]).
    async fn execute(&self, call: &ToolCall, runtime: &ToolRuntime) -> Result<ExecutionResult, TaskerError>;
}

/// Executes calls against a [`ToolRegistry`]
pub struct RegistryExecutor {
    registry: ToolRegistry,
    max_retries: usize,
}

impl RegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl Executor for RegistryExecutor {
    async fn execute(&self, call: &ToolCall, runtime: &ToolRuntime) -> Result<ExecutionResult, TaskerError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| TaskerError::UnknownTool(call.name.clone()))?;

        // Bad arguments never reach the tool
        if let Err(e) = validate_arguments(&tool.definition().parameters, &call.arguments) {
            debug!(tool = %call.name, error = %e, "Rejected arguments");
            return Ok(ExecutionResult::failure(call, e.to_string()));
        }

        let mut attempt = 0;
        loop {
            let runtime = runtime.clone().with_attempt(attempt);
            let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone(), &runtime))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(ToolError::Execution("tool panicked".to_string())));

            match outcome {
                Ok(result) => {
                    debug!(tool = %call.name, attempt, "Tool completed");
                    return Ok(ExecutionResult::success(call, result.message, result.data));
                }
                // Retrying cannot fix the arguments
                Err(e @ ToolError::InvalidArguments(_)) => {
                    return Ok(ExecutionResult::failure(call, e.to_string()));
                }
                Err(e) if attempt >= self.max_retries => {
                    warn!(tool = %call.name, attempts = attempt + 1, error = %e, "Tool failed after retries");
                    return Ok(ExecutionResult::failure(call, e.to_string()));
                }
                Err(e) => {
                    warn!(tool = %call.name, attempt, error = %e, "Tool failed, retrying");
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EmailTool, LogTransport, Tool, ToolDefinition, ToolResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails `failures` times, then succeeds
    struct FlakyTool {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "flaky".to_string(),
                description: "Sometimes works".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, _args: serde_json::Value, runtime: &ToolRuntime) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if runtime.attempt() < self.failures {
                Err(ToolError::Transport("connection reset".to_string()))
            } else {
                Ok(ToolResult::new("ok"))
            }
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "boom".to_string(),
                description: "Panics".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, _args: serde_json::Value, _runtime: &ToolRuntime) -> Result<ToolResult, ToolError> {
            panic!("kaboom")
        }
    }

    fn flaky(failures: usize) -> (RegistryExecutor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = FlakyTool { failures, calls: calls.clone() };
        (RegistryExecutor::new(ToolRegistry::new().with_tool(Arc::new(tool))), calls)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let executor = RegistryExecutor::new(ToolRegistry::new());
        let err = executor
            .execute(&ToolCall::new("missing", json!({})), &ToolRuntime::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskerError::UnknownTool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (executor, calls) = flaky(2);
        let result = executor
            .execute(&ToolCall::new("flaky", json!({})), &ToolRuntime::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (executor, calls) = flaky(10);
        let executor = executor.with_max_retries(1);
        let result = executor
            .execute(&ToolCall::new("flaky", json!({})), &ToolRuntime::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection reset"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_schema_violation_skips_the_tool() {
        let executor =
            RegistryExecutor::new(ToolRegistry::new().with_tool(Arc::new(EmailTool::new(LogTransport))));
        let call = ToolCall::new("send_email", json!({"to_email": "ana@example.com", "subject": "Hi"}));

        let result = executor.execute(&call, &ToolRuntime::new()).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing required field 'message'"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let executor = RegistryExecutor::new(ToolRegistry::new().with_tool(Arc::new(PanickingTool)));
        let result = executor
            .execute(&ToolCall::new("boom", json!({})), &ToolRuntime::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.observation(), "ERROR: Tool execution error: tool panicked");
    }
}
