//! MCP client error types.

use crate::client::SessionState;
use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server not found.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// Server name already registered.
    #[error("Server already registered: {0}")]
    DuplicateServer(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server process failed.
    #[error("Server process error: {0}")]
    ProcessError(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The server responded with a JSON-RPC error.
    #[error("Server error {code}: {message}")]
    Api { code: i64, message: String },

    /// Malformed configuration or response payload.
    #[error("Data error: {0}")]
    Data(String),

    /// Operation attempted while the session is not ready.
    #[error("Session is not ready: current state is {0}")]
    InvalidState(SessionState),

    /// Invalid request from the caller.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server initialization failed.
    #[error("Server initialization failed: {0}")]
    InitializationFailed(String),

    /// Authentication required.
    #[error("Authentication required")]
    AuthRequired,

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// Whether this error indicates the transport could not be reached.
    ///
    /// Callers may retry such failures by re-initializing the session.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ProcessError(_) | Self::Io(_) | Self::Http(_)
        )
    }

    /// Whether this error is a timeout.
    ///
    /// Distinct from connection failures so callers can apply a different
    /// retry policy.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
