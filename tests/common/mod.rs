//! In-process mock MCP server backed by wiremock.
//!
//! Speaks enough of the protocol for end-to-end client tests: initialize
//! handshake, a small arithmetic tool set, one readable resource, one URI
//! template, and subscribe/unsubscribe acknowledgements.

use serde_json::{json, Value};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// JSON-RPC responder dispatching on the request's `method` field.
pub struct McpResponder {
    pub server_name: String,
    pub tools: Vec<String>,
}

impl McpResponder {
    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": true, "listChanged": false },
                    "prompts": { "listChanged": false }
                },
                "serverInfo": { "name": self.server_name, "version": "1.0.0" },
                "instructions": "A mock arithmetic server"
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self
                    .tools
                    .iter()
                    .map(|name| {
                        json!({
                            "name": name,
                            "description": format!("The {name} operation"),
                            "inputSchema": {
                                "type": "object",
                                "properties": {
                                    "a": { "type": "integer" },
                                    "b": { "type": "integer" }
                                },
                                "required": ["a", "b"]
                            }
                        })
                    })
                    .collect::<Vec<_>>()
            })),
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or_default();
                let a = params["arguments"]["a"].as_i64().unwrap_or_default();
                let b = params["arguments"]["b"].as_i64().unwrap_or_default();
                let value = match name {
                    "add" => a + b,
                    "multiply" => a * b,
                    _ => return Err((-32602, format!("Unknown tool: {name}"))),
                };
                Ok(json!({
                    "content": [{ "type": "text", "text": value.to_string() }],
                    "isError": false
                }))
            }
            "prompts/list" => Ok(json!({
                "prompts": [{
                    "name": "explain",
                    "description": "Explain a calculation",
                    "arguments": [
                        { "name": "expression", "required": true }
                    ]
                }]
            })),
            "prompts/get" => {
                let expression = params["arguments"]["expression"]
                    .as_str()
                    .unwrap_or("nothing");
                Ok(json!({
                    "description": "Explain a calculation",
                    "messages": [{
                        "role": "user",
                        "content": {
                            "type": "text",
                            "text": format!("Explain step by step: {expression}")
                        }
                    }]
                }))
            }
            "resources/list" => Ok(json!({
                "resources": [{
                    "uri": "mem://status",
                    "name": "status",
                    "mimeType": "text/plain"
                }]
            })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": [{
                    "uriTemplate": "mem://greeting/{name}",
                    "name": "greeting",
                    "mimeType": "text/plain"
                }]
            })),
            "resources/read" => {
                let uri = params["uri"].as_str().unwrap_or_default();
                if uri == "mem://status" {
                    Ok(json!({
                        "contents": [{
                            "uri": uri,
                            "mimeType": "text/plain",
                            "text": "all systems operational"
                        }]
                    }))
                } else if let Some(name) = uri.strip_prefix("mem://greeting/") {
                    Ok(json!({
                        "contents": [{
                            "uri": uri,
                            "mimeType": "text/plain",
                            "text": format!("Hello, {name}!")
                        }]
                    }))
                } else {
                    Err((-32002, format!("Resource not found: {uri}")))
                }
            }
            "resources/subscribe" | "resources/unsubscribe" => Ok(json!({})),
            other => Err((-32601, format!("Method not found: {other}"))),
        }
    }
}

impl Respond for McpResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let message: Value = match serde_json::from_slice(&request.body) {
            Ok(value) => value,
            Err(_) => return ResponseTemplate::new(400),
        };

        // Notifications carry no id and expect no response body.
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            return ResponseTemplate::new(202);
        };

        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let body = match self.dispatch(method, &params) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message }
            }),
        };

        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Start a mock server offering the `add` and `multiply` tools.
pub async fn start_mock_server(name: &str) -> MockServer {
    start_mock_server_with_tools(name, &["add", "multiply"]).await
}

/// Start a mock server offering the given tools.
pub async fn start_mock_server_with_tools(name: &str, tools: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(McpResponder {
            server_name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        })
        .mount(&server)
        .await;
    server
}
