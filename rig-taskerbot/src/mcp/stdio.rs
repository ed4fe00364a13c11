//! MCP server spawned as a child process, JSON-RPC over stdin/stdout

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::protocol::{
    InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolDefinition,
    ToolCallParams, ToolCallResult,
};
use super::{McpClient, McpError};

/// Per-request wait for the matching response
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Variables passed through to the child; everything else is cleared
const INHERITED_ENV: [&str; 5] = ["PATH", "HOME", "USER", "LANG", "TERM"];

pub struct StdioMcpServer {
    server_id: String,
    next_id: AtomicU64,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Option<Child>>,
}

impl StdioMcpServer {
    /// Spawn `program args...` and run the initialize handshake.
    pub async fn spawn(
        server_id: &str,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.envs(env);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;

        let server = Self {
            server_id: server_id.to_string(),
            next_id: AtomicU64::new(1),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(Some(child)),
        };

        server.initialize().await?;
        Ok(server)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::to_value(InitializeParams::new())?;
        let response = self.send_request("initialize", Some(params)).await?;
        debug!(server_id = %self.server_id, response = %response, "MCP server initialized");

        self.write_line(&serde_json::to_string(&JsonRpcNotification::new("notifications/initialized"))?)
            .await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_line(&serde_json::to_string(&JsonRpcRequest::new(id, method, params))?)
            .await?;

        tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout)??
            .into_result()
    }

    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `expected_id`
    async fn read_response(&self, expected_id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut stdout = self.stdout.lock().await;
        let mut buf = String::new();
        loop {
            buf.clear();
            if stdout.read_line(&mut buf).await? == 0 {
                return Err(McpError::Transport("server closed stdout".into()));
            }
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(line) {
                Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
                Ok(resp) => debug!(server_id = %self.server_id, id = ?resp.id, "Skipping unrelated message"),
                Err(_) => debug!(server_id = %self.server_id, line, "Skipping non JSON-RPC line"),
            }
        }
    }
}

#[async_trait]
impl McpClient for StdioMcpServer {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.send_request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| serde_json::json!([]));

        serde_json::from_value(tools).map_err(|e| McpError::Protocol(format!("failed to parse tools list: {e}")))
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String, McpError> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })?;
        let result = self.send_request("tools/call", Some(params)).await?;

        let parsed: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("failed to parse tool result: {e}")))?;
        parsed.into_text()
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        if let Some(mut child) = self.child.lock().await.take() {
            // the server may already have exited on its own
            let _ = child.kill().await;
            child.wait().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StdioMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioMcpServer")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}
