//! Stdio transport for local MCP servers (JSON-RPC over child process pipes).
//!
//! MCP stdio framing is newline-delimited JSON: one message per line on
//! stdin/stdout. The server's stderr is left attached to the parent so its
//! logs stay visible.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// The child's pipe pair. Held behind one lock so a request/response
/// exchange crosses the pipe without interleaving.
struct ChildIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ChildIo {
    async fn send_line(&mut self, content: &str) -> McpResult<()> {
        trace!(message = %content, "Sending stdio message");
        self.stdin.write_all(content.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> McpResult<Option<String>> {
        let mut line = String::new();
        let bytes = self.stdout.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }
        trace!(message = %line.trim_end(), "Received stdio message");
        Ok(Some(line))
    }
}

/// Stdio transport: spawns the server as a child process and speaks
/// JSON-RPC over its stdin/stdout. The pipes are exclusively owned by
/// this transport.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    io: Mutex<Option<ChildIo>>,
    connected: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process and wire up its pipes.
    pub async fn spawn(command: &str, args: &[String]) -> McpResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!(command = command, args = ?args, "Starting MCP server process");

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::ProcessError(format!("Failed to start server: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::ProcessError("Failed to get stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::ProcessError("Failed to get stdout".to_string()))?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            io: Mutex::new(Some(ChildIo {
                stdin,
                stdout: BufReader::new(stdout),
            })),
            connected: AtomicBool::new(true),
        })
    }

    /// Whether a line is the response to the given request id.
    ///
    /// Server-initiated requests carry a `method` field and their own id
    /// space; notifications carry no id. Both are skipped.
    fn is_response_for(value: &Value, id: u64) -> bool {
        value.get("method").is_none() && value.get("id").and_then(Value::as_u64) == Some(id)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let mut io_guard = self.io.lock().await;
        let io = io_guard
            .as_mut()
            .ok_or_else(|| McpError::connection_failed("Transport closed"))?;

        io.send_line(&serde_json::to_string(&request)?).await?;

        loop {
            let Some(line) = io.read_line().await? else {
                self.connected.store(false, Ordering::SeqCst);
                return Err(McpError::connection_failed("Server closed connection"));
            };

            let value: Value = match serde_json::from_str(line.trim()) {
                Ok(value) => value,
                Err(e) => {
                    trace!(error = %e, "Skipping non-JSON line from server");
                    continue;
                }
            };

            if Self::is_response_for(&value, request.id) {
                return serde_json::from_value(value)
                    .map_err(|e| McpError::protocol_error(format!("Invalid response: {e}")));
            }

            trace!("Skipping unsolicited server message");
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let mut io_guard = self.io.lock().await;
        let io = io_guard
            .as_mut()
            .ok_or_else(|| McpError::connection_failed("Transport closed"))?;

        io.send_line(&serde_json::to_string(&notification)?).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        // Dropping stdin signals EOF so a well-behaved server exits on its own.
        let mut io_guard = self.io.lock().await;
        *io_guard = None;
        drop(io_guard);

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = child.kill().await;
        }

        debug!("Closed stdio transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(ref mut child) = *guard {
                let _ = child.start_kill();
            }
        }
    }
}
