//! Tools served by MCP (Model Context Protocol) servers
//!
//! Servers are described in a JSON map, one entry per server:
//!
//! ```json
//! {
//!   "files": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]},
//!   "crm": {"command": "./crm-mcp", "env": {"CRM_TOKEN": "..."}}
//! }
//! ```
//!
//! [`load_mcp_tools`] starts every server, lists its tools and wraps each one
//! as a regular [`Tool`]. A server that fails to start is logged and skipped;
//! the bot keeps working with the tools it has.

pub mod protocol;
pub mod stdio;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{TaskerError, ToolError};
use crate::runtime::ToolRuntime;
use crate::tools::{DynTool, Tool, ToolDefinition, ToolResult};

pub use protocol::McpToolDefinition;
pub use stdio::StdioMcpServer;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("failed to start MCP server: {0}")]
    SpawnFailed(String),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP tool reported an error: {0}")]
    ToolFailed(String),

    #[error("MCP request timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One connected MCP server
#[async_trait]
pub trait McpClient: Send + Sync {
    fn server_id(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Call `name` and return its text output
    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String, McpError>;

    async fn shutdown(&self) -> Result<(), McpError>;
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Only `stdio` is supported
    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_transport() -> String {
    "stdio".to_string()
}

/// Servers by name, started in name order
pub type McpServers = BTreeMap<String, McpServerConfig>;

pub fn parse_servers(json: &str) -> Result<McpServers, TaskerError> {
    serde_json::from_str(json).map_err(|e| TaskerError::Config(format!("invalid MCP server map: {e}")))
}

pub fn load_servers(path: &Path) -> Result<McpServers, TaskerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| TaskerError::Config(format!("cannot read MCP config {}: {e}", path.display())))?;
    parse_servers(&raw)
}

// =============================================================================
// TOOL ADAPTER
// =============================================================================

/// A tool living on an MCP server
pub struct McpTool {
    client: Arc<dyn McpClient>,
    definition: McpToolDefinition,
}

impl McpTool {
    pub fn new(client: Arc<dyn McpClient>, definition: McpToolDefinition) -> Self {
        Self { client, definition }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            parameters: self.definition.input_schema.clone(),
        }
    }

    async fn execute(&self, args: serde_json::Value, _runtime: &ToolRuntime) -> Result<ToolResult, ToolError> {
        let output = self
            .client
            .call_tool(&self.definition.name, args)
            .await
            .map_err(|e| match e {
                McpError::ToolFailed(msg) => ToolError::Execution(msg),
                other => ToolError::Transport(format!("{}: {other}", self.client.server_id())),
            })?;
        Ok(ToolResult::new(output))
    }
}

/// Wrap every tool `client` advertises
pub async fn tools_from_client(client: Arc<dyn McpClient>) -> Result<Vec<DynTool>, McpError> {
    let definitions = client.list_tools().await?;
    Ok(definitions
        .into_iter()
        .map(|d| Arc::new(McpTool::new(client.clone(), d)) as DynTool)
        .collect())
}

// =============================================================================
// LOADING
// =============================================================================

/// Connected servers and the tools they provide
#[derive(Default)]
pub struct McpToolSet {
    pub tools: Vec<DynTool>,
    clients: Vec<Arc<dyn McpClient>>,
}

impl McpToolSet {
    pub fn server_count(&self) -> usize {
        self.clients.len()
    }

    /// Stop every server
    pub async fn shutdown(&self) {
        for client in &self.clients {
            if let Err(e) = client.shutdown().await {
                warn!(server = client.server_id(), error = %e, "MCP shutdown failed");
            }
        }
    }
}

/// Start each configured server and collect its tools.
///
/// Failures are logged and the server is skipped.
pub async fn load_mcp_tools(servers: &McpServers) -> McpToolSet {
    let mut set = McpToolSet::default();

    for (name, config) in servers {
        if config.transport != "stdio" {
            warn!(server = %name, transport = %config.transport, "Unsupported MCP transport, skipping");
            continue;
        }

        let client: Arc<dyn McpClient> =
            match StdioMcpServer::spawn(name, &config.command, &config.args, &config.env).await {
                Ok(server) => Arc::new(server),
                Err(e) => {
                    warn!(server = %name, error = %e, "MCP server failed to start");
                    continue;
                }
            };

        match tools_from_client(client.clone()).await {
            Ok(tools) => {
                info!(server = %name, tools = tools.len(), "MCP server ready");
                set.tools.extend(tools);
                set.clients.push(client);
            }
            Err(e) => {
                warn!(server = %name, error = %e, "MCP tools/list failed");
                let _ = client.shutdown().await;
            }
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers from a fixed tool list and records calls
    struct FakeServer {
        tools: Vec<McpToolDefinition>,
        calls: Mutex<Vec<(String, serde_json::Value)>>,
        fail_with: Option<fn() -> McpError>,
    }

    fn order_tool() -> McpToolDefinition {
        McpToolDefinition {
            name: "lookup_order".into(),
            description: "Find an order".into(),
            input_schema: json!({"type": "object", "required": ["order_id"]}),
        }
    }

    impl FakeServer {
        fn new() -> Self {
            Self {
                tools: vec![order_tool()],
                calls: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl McpClient for FakeServer {
        fn server_id(&self) -> &str {
            "shop"
        }

        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String, McpError> {
            self.calls.lock().unwrap().push((name.to_string(), arguments));
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok("order 7 shipped".into()),
            }
        }

        async fn shutdown(&self) -> Result<(), McpError> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_servers() {
        let servers = parse_servers(
            r#"{"files": {"command": "npx", "args": ["server-fs"]}, "web": {"command": "x", "transport": "sse"}}"#,
        )
        .unwrap();

        assert_eq!(servers["files"].args, vec!["server-fs"]);
        assert_eq!(servers["files"].transport, "stdio");
        assert_eq!(servers["web"].transport, "sse");
        assert!(matches!(parse_servers("[1]"), Err(TaskerError::Config(_))));
    }

    #[tokio::test]
    async fn test_tools_wrap_server_definitions() {
        let server = Arc::new(FakeServer::new());
        let tools = tools_from_client(server.clone()).await.unwrap();

        let def = tools[0].definition();
        assert_eq!(def.name, "lookup_order");
        assert_eq!(def.parameters["required"], json!(["order_id"]));

        let result = tools[0].execute(json!({"order_id": "7"}), &ToolRuntime::new()).await.unwrap();
        assert_eq!(result.message, "order 7 shipped");
        assert_eq!(
            server.calls.lock().unwrap()[0],
            ("lookup_order".to_string(), json!({"order_id": "7"}))
        );
    }

    #[tokio::test]
    async fn test_tool_failures_map_to_tool_errors() {
        let mut server = FakeServer::new();
        server.fail_with = Some(|| McpError::ToolFailed("unknown order".into()));
        let tool = McpTool::new(Arc::new(server), order_tool());

        let err = tool.execute(json!({"order_id": "9"}), &ToolRuntime::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(msg) if msg == "unknown order"));

        let mut server = FakeServer::new();
        server.fail_with = Some(|| McpError::Timeout);
        let tool = McpTool::new(Arc::new(server), order_tool());

        let err = tool.execute(json!({"order_id": "9"}), &ToolRuntime::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Transport error: shop: MCP request timed out");
    }

    #[tokio::test]
    async fn test_unstartable_servers_are_skipped() {
        let servers = parse_servers(
            r#"{"missing": {"command": "/nonexistent/taskerbot-mcp-server"}, "remote": {"command": "x", "transport": "sse"}}"#,
        )
        .unwrap();

        let set = load_mcp_tools(&servers).await;

        assert!(set.tools.is_empty());
        assert_eq!(set.server_count(), 0);
    }
}
