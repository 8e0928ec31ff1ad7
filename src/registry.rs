//! Multi-server registry.
//!
//! A [`MultiServerClient`] owns a named collection of sessions and is the
//! entry point for orchestration across several MCP servers at once. The
//! registry's lock covers only the name-to-session mapping; network I/O on
//! individual sessions never runs under it.

use crate::client::{McpClient, ServerMetadata, SessionState};
use crate::config::{self, ConnectionParams, McpConfig};
use crate::error::{McpError, McpResult};
use crate::protocol::{
    GetPromptResult, ListResourcesResult, McpTool, PromptInfo, ResourceContents, ToolCallResult,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct ServerEntry {
    name: String,
    client: Arc<McpClient>,
}

/// Client for multiple named MCP servers.
///
/// Entries are added by explicit connect calls and never removed; closing
/// the registry closes every contained session. Insertion order is
/// preserved and observable in aggregate listings.
pub struct MultiServerClient {
    servers: RwLock<Vec<ServerEntry>>,
}

impl std::fmt::Debug for MultiServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiServerClient").finish_non_exhaustive()
    }
}

impl MultiServerClient {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
        }
    }

    /// Connect every server defined in an `mcp.json` file.
    ///
    /// Servers are connected in sorted name order. On any failure the
    /// already-connected sessions are closed and the error propagates.
    pub async fn from_config(path: Option<&Path>) -> McpResult<Self> {
        let path = config::find_config_file(path)?
            .ok_or_else(|| McpError::config("No mcp.json configuration file found"))?;
        let config = McpConfig::load(&path)?;

        let registry = Self::new();
        for name in config.server_names() {
            let params = config.server_params(Some(name.as_str()))?;
            if let Err(e) = registry.connect_to_server(name.as_str(), params).await {
                if let Err(close_err) = registry.close_all().await {
                    warn!(error = %close_err, "Error closing sessions after failed connect");
                }
                return Err(e);
            }
        }
        Ok(registry)
    }

    /// Connect to a server and register it under `name`.
    ///
    /// The new session is inserted only after it reaches ready, so a failed
    /// initialization never affects existing entries. A duplicate name is a
    /// configuration error and the registry keeps the first session.
    pub async fn connect_to_server(
        &self,
        name: impl Into<String>,
        params: ConnectionParams,
    ) -> McpResult<()> {
        let name = name.into();
        if self.contains(&name).await {
            return Err(McpError::DuplicateServer(name));
        }

        info!(server = %name, transport = %params.transport, "Connecting to MCP server");
        let client = Arc::new(McpClient::new(params));
        client.initialize().await?;
        self.add_session(name, client).await
    }

    /// Register an already-initialized session under `name`.
    ///
    /// Useful for sessions over custom transports. The session must be
    /// ready; the registry takes ownership of its lifetime.
    pub async fn add_session(&self, name: impl Into<String>, client: Arc<McpClient>) -> McpResult<()> {
        let name = name.into();
        let state = client.state().await;
        if state != SessionState::Ready {
            return Err(McpError::InvalidState(state));
        }

        let mut servers = self.servers.write().await;
        if servers.iter().any(|entry| entry.name == name) {
            drop(servers);
            // Lost the race to another connect under the same name; the
            // newcomer is torn down, the first session is retained.
            if let Err(e) = client.close().await {
                warn!(server = %name, error = %e, "Error closing duplicate session");
            }
            return Err(McpError::DuplicateServer(name));
        }

        servers.push(ServerEntry { name, client });
        Ok(())
    }

    /// Whether a server is registered under `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.servers
            .read()
            .await
            .iter()
            .any(|entry| entry.name == name)
    }

    /// Registered server names, in insertion order.
    pub async fn server_names(&self) -> Vec<String> {
        self.servers
            .read()
            .await
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// The session registered under `name`.
    pub async fn session(&self, name: &str) -> McpResult<Arc<McpClient>> {
        self.servers
            .read()
            .await
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.client.clone())
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))
    }

    async fn snapshot(&self) -> Vec<(String, Arc<McpClient>)> {
        self.servers
            .read()
            .await
            .iter()
            .map(|entry| (entry.name.clone(), entry.client.clone()))
            .collect()
    }

    /// All tools across all ready sessions, concatenated in insertion order.
    ///
    /// Best-effort fan-out: a session that is not ready, or whose listing
    /// fails, is skipped so one unreachable server does not block discovery
    /// of the others. Tool name collisions across servers are preserved
    /// as-is; disambiguation is the caller's concern.
    pub async fn get_tools(&self) -> Vec<McpTool> {
        let mut tools = Vec::new();
        for (name, client) in self.snapshot().await {
            if client.state().await != SessionState::Ready {
                debug!(server = %name, "Skipping session that is not ready");
                continue;
            }
            match client.list_tools().await {
                Ok(server_tools) => tools.extend(server_tools),
                Err(e) => {
                    warn!(server = %name, error = %e, "Failed to list tools; skipping server");
                }
            }
        }
        tools
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> McpResult<ToolCallResult> {
        self.session(server_name).await?.call_tool(tool, arguments).await
    }

    /// Fetch a prompt from a specific server.
    pub async fn get_prompt(
        &self,
        server_name: &str,
        prompt: &str,
        arguments: Option<Value>,
    ) -> McpResult<GetPromptResult> {
        self.session(server_name)
            .await?
            .get_prompt(prompt, arguments)
            .await
    }

    /// List prompts on a specific server.
    pub async fn list_prompts(&self, server_name: &str) -> McpResult<Vec<PromptInfo>> {
        self.session(server_name).await?.list_prompts().await
    }

    /// List resources and templates on a specific server.
    pub async fn list_resources(&self, server_name: &str) -> McpResult<ListResourcesResult> {
        self.session(server_name).await?.list_resources().await
    }

    /// Read a resource on a specific server.
    pub async fn read_resource(
        &self,
        server_name: &str,
        uri: &str,
    ) -> McpResult<Vec<ResourceContents>> {
        self.session(server_name).await?.read_resource(uri).await
    }

    /// Subscribe to a resource on a specific server.
    pub async fn subscribe_resource(&self, server_name: &str, uri: &str) -> McpResult<()> {
        self.session(server_name).await?.subscribe_resource(uri).await
    }

    /// Cancel a resource subscription on a specific server.
    pub async fn unsubscribe_resource(&self, server_name: &str, uri: &str) -> McpResult<()> {
        self.session(server_name)
            .await?
            .unsubscribe_resource(uri)
            .await
    }

    /// Metadata of a specific server.
    pub async fn server_metadata(&self, server_name: &str) -> McpResult<ServerMetadata> {
        self.session(server_name).await?.server_metadata().await
    }

    /// Close every contained session.
    ///
    /// Best-effort cleanup: the first close error is recorded, closing
    /// continues for all remaining sessions, and the recorded error is
    /// returned once every session has been attempted.
    pub async fn close_all(&self) -> McpResult<()> {
        let mut first_error = None;
        for (name, client) in self.snapshot().await {
            if let Err(e) = client.close().await {
                warn!(server = %name, error = %e, "Error closing server connection");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run `f` against the registry, then close every session on every
    /// exit path. The body's error wins over a close error.
    pub async fn scope<T, F>(&self, f: F) -> McpResult<T>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, McpResult<T>>,
    {
        let result = f(self).await;
        let close_result = self.close_all().await;
        match result {
            Ok(value) => {
                close_result?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = close_result {
                    warn!(error = %close_err, "Error closing registry sessions");
                }
                Err(e)
            }
        }
    }
}

impl Default for MultiServerClient {
    fn default() -> Self {
        Self::new()
    }
}
