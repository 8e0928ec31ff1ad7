//! Connection parameters and `mcp.json` configuration resolution.
//!
//! A configuration file declares named servers; resolution picks one server
//! entry, validates its transport, and produces the [`ConnectionParams`]
//! used to open a session. Secrets may be given indirectly as `env:VAR`.

use crate::error::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default per-operation timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Prefix marking an environment-variable indirection in `api_key`.
const ENV_KEY_PREFIX: &str = "env:";

/// Config file name searched in the working directory and XDG directory.
const CONFIG_FILE_NAME: &str = "mcp.json";

/// Server name used when neither an explicit name nor a declared default
/// is available.
const FALLBACK_SERVER_NAME: &str = "default";

/// Supported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local server spawned as a child process, pipes as the channel.
    Stdio,
    /// Remote server over SSE / streamable HTTP.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// How to reach one MCP server. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub transport: TransportKind,
    /// Server URL. Used by the sse transport only.
    pub base_url: Option<String>,
    /// Executable to spawn. Used by the stdio transport only.
    pub command: Option<String>,
    /// Arguments for the command.
    pub args: Vec<String>,
    /// Resolved credential, attached as a bearer token when present.
    pub api_key: Option<String>,
    /// Per-operation timeout.
    pub timeout: Duration,
    pub description: Option<String>,
}

impl ConnectionParams {
    /// Parameters for a remote SSE server.
    pub fn sse(base_url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Sse,
            base_url: Some(base_url.into()),
            command: None,
            args: Vec::new(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            description: None,
        }
    }

    /// Parameters for a local stdio server.
    pub fn stdio(command: impl Into<String>, args: Vec<impl Into<String>>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            base_url: None,
            command: Some(command.into()),
            args: args.into_iter().map(|a| a.into()).collect(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            description: None,
        }
    }

    /// Override the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the credential.
    ///
    /// An `env:VAR` value is resolved from the environment now; if the
    /// variable is unset, no credential is attached and requests go out
    /// unauthenticated.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = resolve_api_key(&api_key.into());
        self
    }

    /// Set the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check that exactly the fields for the chosen transport are populated.
    pub fn validate(&self) -> McpResult<()> {
        match self.transport {
            TransportKind::Sse => {
                if self.base_url.is_none() {
                    return Err(McpError::config("'base_url' is required for sse transport"));
                }
                if self.command.is_some() || !self.args.is_empty() {
                    return Err(McpError::config(
                        "'command' and 'args' are not valid for sse transport",
                    ));
                }
            }
            TransportKind::Stdio => {
                if self.command.is_none() {
                    return Err(McpError::config(
                        "'command' is required for stdio transport",
                    ));
                }
                if self.base_url.is_some() {
                    return Err(McpError::config(
                        "'base_url' is not valid for stdio transport",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Resolve an api key value, following `env:VAR` indirection.
///
/// An unset variable yields no credential rather than an error; the caller
/// ends up making unauthenticated requests.
fn resolve_api_key(raw: &str) -> Option<String> {
    match raw.strip_prefix(ENV_KEY_PREFIX) {
        Some(var) => match std::env::var(var) {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(var = var, "API key environment variable not set");
                None
            }
        },
        None => Some(raw.to_string()),
    }
}

/// One server entry as written in `mcp.json`.
///
/// The transport keyword is kept as a free string here so configuration
/// errors can name unsupported values instead of failing JSON parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServerDefinition {
    /// Validate the entry and produce connection parameters.
    pub fn to_params(&self) -> McpResult<ConnectionParams> {
        let transport = match self.transport.as_str() {
            "stdio" => TransportKind::Stdio,
            "sse" => TransportKind::Sse,
            "http" => {
                return Err(McpError::config(
                    "HTTP transport is not supported; use 'sse'",
                ));
            }
            other => {
                return Err(McpError::config(format!("Unsupported transport: '{other}'")));
            }
        };

        let mut params = match transport {
            TransportKind::Sse => {
                let base_url = self.base_url.clone().ok_or_else(|| {
                    McpError::config("'base_url' is required for sse transport")
                })?;
                ConnectionParams::sse(base_url)
            }
            TransportKind::Stdio => {
                let command = self.command.clone().ok_or_else(|| {
                    McpError::config("'command' is required for stdio transport")
                })?;
                ConnectionParams::stdio(command, self.args.clone())
            }
        };

        if let Some(ref api_key) = self.api_key {
            params = params.with_api_key(api_key);
        }
        if let Some(timeout) = self.timeout {
            params = params.with_timeout(Duration::from_secs(timeout));
        }
        if let Some(ref description) = self.description {
            params = params.with_description(description);
        }

        params.validate()?;
        Ok(params)
    }
}

/// Parsed `mcp.json` configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_server: Option<String>,
    #[serde(default)]
    pub servers: HashMap<String, ServerDefinition>,
}

impl McpConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> McpResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| McpError::config(format!("Failed to read {}: {e}", path.display())))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse configuration content. `origin` names the source in errors.
    pub fn parse(content: &str, origin: &str) -> McpResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| McpError::data(format!("Invalid JSON in {origin}: {e}")))?;

        if config.servers.is_empty() {
            return Err(McpError::data(format!(
                "Missing 'servers' mapping in {origin}"
            )));
        }

        Ok(config)
    }

    /// Server names in deterministic (sorted) order.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve connection parameters for a server.
    ///
    /// Lookup order: the explicit `name`, the file's `default_server`,
    /// then the conventional name `default`.
    pub fn server_params(&self, name: Option<&str>) -> McpResult<ConnectionParams> {
        let requested = name
            .or(self.default_server.as_deref())
            .unwrap_or(FALLBACK_SERVER_NAME);

        let definition = self
            .servers
            .get(requested)
            .ok_or_else(|| McpError::ServerNotFound(requested.to_string()))?;

        debug!(server = requested, "Resolved server configuration");
        definition.to_params()
    }
}

/// Locate the configuration file.
///
/// An explicit path bypasses the search and must exist. Otherwise the
/// search order is: `./mcp.json`, `~/.mcp.json`, `~/.config/mcp/mcp.json`.
pub fn find_config_file(explicit: Option<&Path>) -> McpResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(McpError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let cwd = std::env::current_dir()?;
    Ok(find_config_file_in(&cwd, dirs::home_dir().as_deref()))
}

/// Search the well-known locations under the given roots.
fn find_config_file_in(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let mut candidates = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(home) = home {
        candidates.push(home.join(".mcp.json"));
        candidates.push(home.join(".config").join("mcp").join(CONFIG_FILE_NAME));
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Resolve connection parameters straight from a configuration file.
pub fn load_params(server: Option<&str>, path: Option<&Path>) -> McpResult<ConnectionParams> {
    let path = find_config_file(path)?
        .ok_or_else(|| McpError::config("No mcp.json configuration file found"))?;
    McpConfig::load(&path)?.server_params(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_config() -> &'static str {
        r#"{
            "default_server": "local",
            "servers": {
                "local": {
                    "transport": "sse",
                    "base_url": "http://localhost:8000",
                    "api_key": null,
                    "timeout": 30,
                    "description": "Local Test Server"
                },
                "remote": {
                    "transport": "sse",
                    "base_url": "https://remote-mcp.test",
                    "api_key": "remote-key-123"
                },
                "env_key_server": {
                    "transport": "sse",
                    "base_url": "https://env-key.test",
                    "api_key": "env:MCPLINK_TEST_API_KEY",
                    "timeout": 90
                },
                "stdio_server": {
                    "transport": "stdio",
                    "command": "python",
                    "args": ["-m", "mcp.server.cli"],
                    "timeout": 60
                }
            }
        }"#
    }

    #[test]
    fn test_default_server_resolution() {
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        let params = config.server_params(None).unwrap();
        assert_eq!(params.transport, TransportKind::Sse);
        assert_eq!(params.base_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(params.timeout, Duration::from_secs(30));
        assert!(params.api_key.is_none());
        assert_eq!(params.description.as_deref(), Some("Local Test Server"));
    }

    #[test]
    fn test_explicit_server_with_default_timeout() {
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        let params = config.server_params(Some("remote")).unwrap();
        assert_eq!(params.base_url.as_deref(), Some("https://remote-mcp.test"));
        assert_eq!(params.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(params.api_key.as_deref(), Some("remote-key-123"));
    }

    #[test]
    fn test_stdio_server_resolution() {
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        let params = config.server_params(Some("stdio_server")).unwrap();
        assert_eq!(params.transport, TransportKind::Stdio);
        assert_eq!(params.command.as_deref(), Some("python"));
        assert_eq!(params.args, vec!["-m", "mcp.server.cli"]);
        assert!(params.base_url.is_none());
    }

    #[test]
    fn test_env_api_key_resolved() {
        std::env::set_var("MCPLINK_TEST_API_KEY", "key-from-environment");
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        let params = config.server_params(Some("env_key_server")).unwrap();
        assert_eq!(params.api_key.as_deref(), Some("key-from-environment"));
        std::env::remove_var("MCPLINK_TEST_API_KEY");
    }

    #[test]
    fn test_env_api_key_unset_is_not_an_error() {
        std::env::remove_var("MCPLINK_MISSING_KEY");
        let params =
            ConnectionParams::sse("https://example.com").with_api_key("env:MCPLINK_MISSING_KEY");
        assert!(params.api_key.is_none());
    }

    #[test]
    fn test_literal_api_key() {
        let params = ConnectionParams::sse("https://example.com").with_api_key("literal-key");
        assert_eq!(params.api_key.as_deref(), Some("literal-key"));
    }

    #[test]
    fn test_unknown_server_name() {
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        match config.server_params(Some("ghost")) {
            Err(McpError::ServerNotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("Expected ServerNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_server_name() {
        let content = r#"{
            "servers": {
                "default": { "transport": "sse", "base_url": "http://localhost:9000" }
            }
        }"#;
        let config = McpConfig::parse(content, "<test>").unwrap();
        let params = config.server_params(None).unwrap();
        assert_eq!(params.base_url.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_invalid_json() {
        match McpConfig::parse("{invalid json", "<test>") {
            Err(McpError::Data(message)) => assert!(message.contains("Invalid JSON")),
            other => panic!("Expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_servers_mapping() {
        match McpConfig::parse(r#"{"default_server": "local"}"#, "<test>") {
            Err(McpError::Data(message)) => assert!(message.contains("servers")),
            other => panic!("Expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn test_http_transport_rejected() {
        let definition = ServerDefinition {
            transport: "http".to_string(),
            base_url: Some("http://example.com".to_string()),
            command: None,
            args: Vec::new(),
            api_key: None,
            timeout: None,
            description: None,
        };
        match definition.to_params() {
            Err(McpError::Config(message)) => {
                assert!(message.contains("HTTP transport is not supported"));
            }
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let definition = ServerDefinition {
            transport: "websocket".to_string(),
            base_url: None,
            command: None,
            args: Vec::new(),
            api_key: None,
            timeout: None,
            description: None,
        };
        match definition.to_params() {
            Err(McpError::Config(message)) => assert!(message.contains("websocket")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_stdio_requires_command() {
        let definition = ServerDefinition {
            transport: "stdio".to_string(),
            base_url: None,
            command: None,
            args: Vec::new(),
            api_key: None,
            timeout: None,
            description: None,
        };
        assert!(matches!(definition.to_params(), Err(McpError::Config(_))));
    }

    #[test]
    fn test_params_validate_rejects_mixed_groups() {
        let mut params = ConnectionParams::sse("http://localhost:8000");
        params.command = Some("python".to_string());
        assert!(matches!(params.validate(), Err(McpError::Config(_))));

        let mut params = ConnectionParams::stdio("python", Vec::<String>::new());
        params.base_url = Some("http://localhost:8000".to_string());
        assert!(matches!(params.validate(), Err(McpError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("mcp.json");
        fs::write(&path, sample_config()).expect("Failed to write config");

        let config = McpConfig::load(&path).unwrap();
        assert_eq!(config.default_server.as_deref(), Some("local"));
        assert_eq!(config.servers.len(), 4);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        match find_config_file(Some(Path::new("definitely_missing_mcp.json"))) {
            Err(McpError::Config(message)) => {
                assert!(message.contains("definitely_missing_mcp.json"));
            }
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_search_order() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let cwd = temp.path().join("cwd");
        let home = temp.path().join("home");
        fs::create_dir_all(&cwd).unwrap();
        fs::create_dir_all(home.join(".config").join("mcp")).unwrap();

        let cwd_file = cwd.join("mcp.json");
        let home_dot_file = home.join(".mcp.json");
        let xdg_file = home.join(".config").join("mcp").join("mcp.json");

        fs::write(&cwd_file, "{}").unwrap();
        fs::write(&home_dot_file, "{}").unwrap();
        fs::write(&xdg_file, "{}").unwrap();

        // Working directory wins.
        assert_eq!(find_config_file_in(&cwd, Some(&home)), Some(cwd_file.clone()));

        fs::remove_file(&cwd_file).unwrap();
        assert_eq!(
            find_config_file_in(&cwd, Some(&home)),
            Some(home_dot_file.clone())
        );

        fs::remove_file(&home_dot_file).unwrap();
        assert_eq!(find_config_file_in(&cwd, Some(&home)), Some(xdg_file.clone()));

        fs::remove_file(&xdg_file).unwrap();
        assert_eq!(find_config_file_in(&cwd, Some(&home)), None);
    }

    #[test]
    fn test_server_names_sorted() {
        let config = McpConfig::parse(sample_config(), "<test>").unwrap();
        assert_eq!(
            config.server_names(),
            vec!["env_key_server", "local", "remote", "stdio_server"]
        );
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Stdio.to_string(), "stdio");
        assert_eq!(TransportKind::Sse.to_string(), "sse");
    }
}
