//! SSE (Server-Sent Events) transport for remote MCP servers.
//!
//! This implements the streamable HTTP transport for MCP, which uses:
//! - HTTP POST for sending requests
//! - SSE for receiving responses and events

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header carrying the server-assigned session id.
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// SSE transport configuration.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// The server URL (e.g., `https://mcp.example.com`)
    pub url: String,
    /// Optional authorization token
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_token: None,
            timeout_secs: crate::config::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// SSE transport for remote MCP servers.
pub struct SseTransport {
    config: SseConfig,
    client: Client,
    connected: AtomicBool,
    /// Session id assigned by the server, replayed on every request.
    session_id: RwLock<Option<String>>,
}

impl SseTransport {
    /// Create a new SSE transport.
    ///
    /// Fails before any network I/O if the URL is empty.
    pub fn new(config: SseConfig) -> McpResult<Self> {
        if config.url.is_empty() {
            return Err(McpError::connection_failed(
                "Base URL is required for SSE transport",
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            client,
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
        })
    }

    /// Build request with common headers.
    async fn build_request(&self, body: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(body.to_string());

        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        if let Some(ref session_id) = *self.session_id.read().await {
            req = req.header(SESSION_ID_HEADER, session_id);
        }

        req
    }

    /// Remember the session id the server assigned, if any.
    async fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(session_id) = response.headers().get(SESSION_ID_HEADER) {
            if let Ok(id) = session_id.to_str() {
                *self.session_id.write().await = Some(id.to_string());
            }
        }
    }

    /// Parse a response that may be plain JSON or an SSE stream.
    async fn parse_response(&self, response: reqwest::Response) -> McpResult<JsonRpcResponse> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::AuthRequired);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::protocol_error(format!(
                "Server returned {status}: {text}"
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.contains("text/event-stream") {
            self.parse_sse_stream(response).await
        } else {
            let text = response
                .text()
                .await
                .map_err(|e| McpError::protocol_error(format!("Failed to read response: {e}")))?;

            serde_json::from_str(&text)
                .map_err(|e| McpError::protocol_error(format!("Invalid JSON response: {e}")))
        }
    }

    /// Parse an SSE stream for the JSON-RPC response.
    async fn parse_sse_stream(&self, response: reqwest::Response) -> McpResult<JsonRpcResponse> {
        use futures::StreamExt;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk =
                chunk_result.map_err(|e| McpError::protocol_error(format!("Stream error: {e}")))?;

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for line in buffer.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data) {
                        return Ok(response);
                    }
                }
            }

            // Keep only incomplete lines
            if let Some(last_newline) = buffer.rfind('\n') {
                buffer = buffer[last_newline + 1..].to_string();
            }
        }

        Err(McpError::protocol_error(
            "SSE stream ended without response",
        ))
    }

    fn map_send_error(e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout
        } else if e.is_connect() {
            McpError::connection_failed(format!("Connection failed: {e}"))
        } else {
            McpError::protocol_error(format!("Request failed: {e}"))
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let request_json = serde_json::to_string(&request)?;

        debug!(id = request.id, method = %request.method, "Sending SSE request");

        let response = self
            .build_request(&request_json)
            .await
            .send()
            .await
            .map_err(Self::map_send_error)?;

        self.capture_session_id(&response).await;
        self.connected.store(true, Ordering::SeqCst);
        self.parse_response(response).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let notification_json = serde_json::to_string(&notification)?;

        debug!(method = %notification.method, "Sending SSE notification");

        let response = self
            .build_request(&notification_json)
            .await
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Notification returned non-success status");
        }

        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self.session_id.write().await = None;
        debug!("Closed SSE transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_config_default() {
        let config = SseConfig::default();
        assert!(config.url.is_empty());
        assert!(config.auth_token.is_none());
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_empty_url_rejected_before_network() {
        let result = SseTransport::new(SseConfig::default());
        match result {
            Err(McpError::ConnectionFailed(message)) => {
                assert!(message.contains("Base URL is required"));
            }
            _ => panic!("Expected ConnectionFailed for empty URL"),
        }
    }

    #[test]
    fn test_sse_transport_creation() {
        let config = SseConfig {
            url: "https://example.com/mcp".to_string(),
            auth_token: Some("test-token".to_string()),
            timeout_secs: 30,
        };

        let transport = SseTransport::new(config);
        assert!(transport.is_ok());
    }

    #[test]
    fn test_sse_transport_initially_disconnected() {
        let config = SseConfig {
            url: "https://example.com/mcp".to_string(),
            auth_token: None,
            timeout_secs: 60,
        };

        let transport = SseTransport::new(config).unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_sse_transport_close() {
        let config = SseConfig {
            url: "https://example.com/mcp".to_string(),
            auth_token: None,
            timeout_secs: 60,
        };

        let transport = SseTransport::new(config).unwrap();
        transport.connected.store(true, Ordering::SeqCst);
        *transport.session_id.write().await = Some("abc".to_string());

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(transport.session_id.read().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_transport_request_connection_refused() {
        let config = SseConfig {
            url: "http://127.0.0.1:1".to_string(), // Invalid port
            auth_token: None,
            timeout_secs: 1,
        };

        let transport = SseTransport::new(config).unwrap();
        let request = JsonRpcRequest::new(1, "ping", None);

        let result = transport.request(request).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_build_request_includes_session_id() {
        let config = SseConfig {
            url: "https://example.com/mcp".to_string(),
            auth_token: None,
            timeout_secs: 60,
        };

        let transport = SseTransport::new(config).unwrap();
        *transport.session_id.write().await = Some("session-1".to_string());

        let request = transport.build_request("{}").await.build().unwrap();
        assert_eq!(
            request
                .headers()
                .get(SESSION_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("session-1")
        );
    }

    #[tokio::test]
    async fn test_build_request_auth_header() {
        let config = SseConfig {
            url: "https://example.com/mcp".to_string(),
            auth_token: Some("secret".to_string()),
            timeout_secs: 60,
        };

        let transport = SseTransport::new(config).unwrap();
        let request = transport.build_request("{}").await.build().unwrap();
        assert_eq!(
            request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
    }
}
