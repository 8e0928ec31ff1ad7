//! Multi-server Model Context Protocol (MCP) client.
//!
//! mcplink connects to one or more MCP servers, discovers their tools,
//! prompts, and resources, invokes tools, and reads or subscribes to
//! resources. Connections can be described in code or loaded from an
//! `mcp.json` configuration file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────────┐     ┌─────────────┐
//! │ application │────▶│ MultiServerClient │────▶│ MCP servers │
//! │             │◀────│  └─ McpClient × N │◀────│   (tools)   │
//! └─────────────┘     └───────────────────┘     └─────────────┘
//! ```
//!
//! Each [`McpClient`] exclusively owns one transport channel and walks a
//! session through `uninitialized → initializing → ready → closed`; the
//! [`MultiServerClient`] registry owns many named sessions and aggregates
//! discovery across them.
//!
//! # Supported Transports
//!
//! - **stdio**: local servers spawned as a child process, pipes as the channel
//! - **SSE**: remote servers via streamable HTTP / Server-Sent Events
//!
//! # Example
//!
//! ```no_run
//! use mcplink::{ConnectionParams, McpClient, MultiServerClient};
//!
//! # async fn example() -> mcplink::McpResult<()> {
//! // Connect to a local MCP server over stdio
//! let params = ConnectionParams::stdio("python", vec!["-m", "mcp.server.cli"]);
//! let client = McpClient::new(params);
//! client.initialize().await?;
//!
//! // Discover and call tools
//! let tools = client.list_tools().await?;
//! println!("server provides {} tools", tools.len());
//! let result = client
//!     .call_tool("add", Some(serde_json::json!({"a": 5, "b": 7})))
//!     .await?;
//! println!("add(5, 7) = {}", result.text());
//! client.close().await?;
//!
//! // Or orchestrate several servers from mcp.json
//! let registry = MultiServerClient::from_config(None).await?;
//! let all_tools = registry.get_tools().await;
//! registry.close_all().await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod error;
pub mod protocol;
mod registry;
pub mod sse;
pub mod stdio;
mod transport;

pub use client::{McpClient, ServerMetadata, SessionState};
pub use config::{find_config_file, ConnectionParams, McpConfig, ServerDefinition, TransportKind};
pub use error::{McpError, McpResult};
pub use protocol::{
    GetPromptResult, ListResourcesResult, McpTool, PromptInfo, PromptMessage, Resource,
    ResourceContents, ResourceTemplate, Role, ToolCallResult, ToolContent,
};
pub use registry::MultiServerClient;
pub use sse::{SseConfig, SseTransport};
pub use stdio::StdioTransport;
pub use transport::Transport;
