//! Single-server MCP client.
//!
//! An [`McpClient`] owns exactly one transport channel and tracks the
//! session through its lifecycle: created uninitialized, made ready by an
//! explicit handshake, torn down exactly once on close.

use crate::config::{ConnectionParams, TransportKind};
use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, GetPromptParams, GetPromptResult, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListPromptsResult, ListResourceTemplatesWire,
    ListResourcesResult, ListResourcesWire, ListToolsResult, McpTool, PromptInfo,
    ReadResourceParams, ReadResourceResult, ResourceContents, SubscribeParams, ToolCallResult,
    CODE_METHOD_NOT_FOUND,
};
use crate::sse::{SseConfig, SseTransport};
use crate::stdio::StdioTransport;
use crate::transport::Transport;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no transport opened yet.
    Uninitialized,
    /// Transport opening / handshake in flight.
    Initializing,
    /// Handshake complete, operations permitted.
    Ready,
    /// Initialization failed. Re-initialization is permitted.
    Failed,
    /// Torn down. Terminal.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Immutable server snapshot reported by [`McpClient::server_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    pub name: String,
    pub version: Option<String>,
    pub protocol_version: String,
    pub description: Option<String>,
}

/// Client for a single MCP server.
pub struct McpClient {
    params: ConnectionParams,
    state: RwLock<SessionState>,
    /// The transport channel. Exclusively owned; never handed out.
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Server announcement captured during the handshake.
    server_info: RwLock<Option<InitializeResult>>,
    /// Request ID counter.
    next_id: AtomicU64,
}

impl McpClient {
    /// Create an uninitialized client for the given parameters.
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            state: RwLock::new(SessionState::Uninitialized),
            transport: RwLock::new(None),
            server_info: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a client over an already-opened transport channel.
    ///
    /// The channel becomes exclusively owned by this client; the handshake
    /// still has to be performed via [`Self::initialize`].
    pub fn with_transport(params: ConnectionParams, transport: Arc<dyn Transport>) -> Self {
        Self {
            params,
            state: RwLock::new(SessionState::Uninitialized),
            transport: RwLock::new(Some(transport)),
            server_info: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a client from an `mcp.json` configuration file.
    ///
    /// `server` falls back to the file's declared default server; `path`
    /// falls back to the standard search locations.
    pub fn from_config(
        server: Option<&str>,
        path: Option<&std::path::Path>,
    ) -> McpResult<Self> {
        let params = crate::config::load_params(server, path)?;
        Ok(Self::new(params))
    }

    /// The parameters this client was built from.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Open the transport and perform the protocol handshake.
    ///
    /// A no-op when already ready. Permitted from `Uninitialized` and
    /// `Failed` (connection failures are retryable); an error from any
    /// other state.
    pub async fn initialize(&self) -> McpResult<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                SessionState::Ready => return Ok(()),
                SessionState::Uninitialized | SessionState::Failed => {
                    *state = SessionState::Initializing;
                }
                current => return Err(McpError::InvalidState(current)),
            }
        }

        match self.open_and_handshake().await {
            Ok(()) => {
                *self.state.write().await = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn open_and_handshake(&self) -> McpResult<()> {
        // A transport supplied via with_transport is used as-is.
        let transport = match self.transport.write().await.take() {
            Some(transport) => transport,
            None => self.open_transport().await?,
        };

        let handshake = async {
            let request = JsonRpcRequest::new(
                self.next_request_id(),
                "initialize",
                Some(serde_json::to_value(InitializeParams::default())?),
            );

            let response = transport.request(request).await?;
            if let Some(error) = response.error {
                return Err(McpError::InitializationFailed(error.message));
            }

            let announcement: InitializeResult = serde_json::from_value(
                response
                    .result
                    .ok_or_else(|| McpError::protocol_error("Missing initialize result"))?,
            )
            .map_err(|e| McpError::protocol_error(e.to_string()))?;

            transport
                .notify(JsonRpcNotification::new("notifications/initialized", None))
                .await?;

            Ok(announcement)
        };

        match tokio::time::timeout(self.params.timeout, handshake).await {
            Ok(Ok(announcement)) => {
                info!(
                    server = %announcement.server_info.name,
                    protocol_version = %announcement.protocol_version,
                    transport = %self.params.transport,
                    "MCP session initialized"
                );
                *self.server_info.write().await = Some(announcement);
                *self.transport.write().await = Some(transport);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = transport.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = transport.close().await;
                Err(McpError::Timeout)
            }
        }
    }

    async fn open_transport(&self) -> McpResult<Arc<dyn Transport>> {
        self.params.validate()?;
        match self.params.transport {
            TransportKind::Stdio => {
                let command = self
                    .params
                    .command
                    .as_deref()
                    .ok_or_else(|| McpError::config("'command' is required for stdio transport"))?;
                let transport = StdioTransport::spawn(command, &self.params.args).await?;
                Ok(Arc::new(transport))
            }
            TransportKind::Sse => {
                let config = SseConfig {
                    url: self.params.base_url.clone().unwrap_or_default(),
                    auth_token: self.params.api_key.clone(),
                    // Sub-second timeouts round up; the per-operation timer
                    // enforces the precise value.
                    timeout_secs: self.params.timeout.as_secs().max(1),
                };
                Ok(Arc::new(SseTransport::new(config)?))
            }
        }
    }

    async fn ready_transport(&self) -> McpResult<Arc<dyn Transport>> {
        let state = *self.state.read().await;
        if state != SessionState::Ready {
            return Err(McpError::InvalidState(state));
        }
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::connection_failed("Transport closed"))
    }

    /// One request/response round trip with the per-operation timeout.
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let transport = self.ready_transport().await?;
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        debug!(id = request.id, method = %request.method, "Sending request");

        let response = match tokio::time::timeout(self.params.timeout, transport.request(request))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(McpError::Timeout),
        };

        if let Some(error) = response.error {
            return Err(McpError::Api {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::protocol_error(format!("Missing result for {method}")))
    }

    fn parse<T: DeserializeOwned>(value: Value) -> McpResult<T> {
        serde_json::from_value(value)
            .map_err(|e| McpError::protocol_error(format!("Invalid response payload: {e}")))
    }

    /// Verify liveness with one `ping` round trip.
    pub async fn ping(&self) -> McpResult<()> {
        self.request("ping", None).await?;
        Ok(())
    }

    /// Snapshot of the server's identity, taken from a live session.
    pub async fn server_metadata(&self) -> McpResult<ServerMetadata> {
        self.ping().await?;
        let announcement = self
            .server_info
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::protocol_error("Server announcement missing"))?;
        Ok(ServerMetadata {
            name: announcement.server_info.name,
            version: announcement.server_info.version,
            protocol_version: announcement.protocol_version,
            description: announcement.instructions,
        })
    }

    /// List the server's tools, in server order.
    pub async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        let result: ListToolsResult = Self::parse(self.request("tools/list", None).await?)?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    ///
    /// Arguments are passed through uninterpreted; the server is
    /// authoritative for validating them against the tool's schema.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<ToolCallResult> {
        if name.is_empty() {
            return Err(McpError::InvalidRequest(
                "Tool name must not be empty".to_string(),
            ));
        }

        debug!(tool = name, "Calling tool");
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        Self::parse(
            self.request("tools/call", Some(serde_json::to_value(params)?))
                .await?,
        )
    }

    /// List the server's prompts.
    pub async fn list_prompts(&self) -> McpResult<Vec<PromptInfo>> {
        let result: ListPromptsResult = Self::parse(self.request("prompts/list", None).await?)?;
        Ok(result.prompts)
    }

    /// Fetch a prompt as an ordered sequence of role-tagged messages.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> McpResult<GetPromptResult> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        Self::parse(
            self.request("prompts/get", Some(serde_json::to_value(params)?))
                .await?,
        )
    }

    /// List concrete resources and URI templates.
    ///
    /// Servers predating `resources/templates/list` report method-not-found
    /// for the template listing; that is treated as "no templates".
    pub async fn list_resources(&self) -> McpResult<ListResourcesResult> {
        let resources: ListResourcesWire =
            Self::parse(self.request("resources/list", None).await?)?;

        let templates = match self.request("resources/templates/list", None).await {
            Ok(value) => Self::parse::<ListResourceTemplatesWire>(value)?.resource_templates,
            Err(McpError::Api {
                code: CODE_METHOD_NOT_FOUND,
                ..
            }) => Vec::new(),
            Err(e) => return Err(e),
        };

        Ok(ListResourcesResult {
            resources: resources.resources,
            templates,
        })
    }

    /// Read a resource's content items.
    ///
    /// The URI must be concrete; template placeholders are the caller's
    /// responsibility to substitute first. An unknown URI is a server-side
    /// error, not a transport failure.
    pub async fn read_resource(&self, uri: &str) -> McpResult<Vec<ResourceContents>> {
        if uri.is_empty() {
            return Err(McpError::InvalidRequest(
                "Resource URI must not be empty".to_string(),
            ));
        }

        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let result: ReadResourceResult = Self::parse(
            self.request("resources/read", Some(serde_json::to_value(params)?))
                .await?,
        )?;
        Ok(result.contents)
    }

    /// Subscribe to update notifications for a resource.
    ///
    /// Acknowledgement only; no data is delivered synchronously. Callers
    /// re-read the resource to observe changes.
    pub async fn subscribe_resource(&self, uri: &str) -> McpResult<()> {
        self.subscription_request("resources/subscribe", uri).await
    }

    /// Cancel a resource subscription.
    pub async fn unsubscribe_resource(&self, uri: &str) -> McpResult<()> {
        self.subscription_request("resources/unsubscribe", uri).await
    }

    async fn subscription_request(&self, method: &str, uri: &str) -> McpResult<()> {
        if uri.is_empty() {
            return Err(McpError::InvalidRequest(
                "Resource URI must not be empty".to_string(),
            ));
        }

        let params = SubscribeParams {
            uri: uri.to_string(),
        };
        self.request(method, Some(serde_json::to_value(params)?))
            .await?;
        Ok(())
    }

    /// Close the session and tear down the transport.
    ///
    /// Teardown runs exactly once; repeat calls are no-ops.
    pub async fn close(&self) -> McpResult<()> {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }

        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            transport.close().await?;
        }
        debug!("Session closed");
        Ok(())
    }

    /// Initialize, run `f`, and close on every exit path.
    ///
    /// The body's error wins over a close error; a close failure after a
    /// successful body is surfaced.
    pub async fn with_session<T, F>(&self, f: F) -> McpResult<T>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, McpResult<T>>,
    {
        self.initialize().await?;
        let result = f(self).await;
        let close_result = self.close().await;
        match result {
            Ok(value) => {
                close_result?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = close_result {
                    warn!(error = %close_err, "Error closing session");
                }
                Err(e)
            }
        }
    }
}
