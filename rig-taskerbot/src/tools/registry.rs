// src/tools/registry.rs
//! Tool trait and name-indexed registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::runtime::ToolRuntime;

/// Tool schema exposed to the model for function calling
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object
    pub parameters: serde_json::Value,
}

/// What a tool hands back to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub message: String,
    /// Optional structured payload, checked by validators that require fields
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Errors are reported back to the model, never propagated out of a turn.
    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError>;
}

pub type DynTool = Arc<dyn Tool>;

/// Tools by name.
///
/// ```ignore
/// let mut registry = ToolRegistry::new();
/// registry.register(Arc::new(EmailTool::new(LogTransport)));
///
/// if let Some(tool) = registry.get("send_email") {
///     let result = tool.execute(args, &ToolRuntime::new()).await?;
/// }
/// ```
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, DynTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a tool with the same name is replaced
    pub fn register(&mut self, tool: DynTool) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    pub fn register_all(&mut self, tools: Vec<DynTool>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn with_tool(mut self, tool: DynTool) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DynTool> {
        self.tools.get(name)
    }

    /// Definitions sorted by name so prompts are stable between calls
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
