//! Configuration for the ML service tools
//!
//! Sources, highest precedence first:
//! 1. CLI arguments
//! 2. Environment variables (ML_SERVICE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::BusScope;
use crate::edge::TcpEdgeConfig;
use crate::error::{Error, Result};
use crate::framing::MAX_FRAME_SIZE;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// ML agent daemon access
    pub agent: AgentSettings,

    /// Edge transport tuning
    pub edge: EdgeSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// ML agent daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Socket of the system-wide daemon
    pub system_socket: String,

    /// Socket of the per-user daemon (None = no session endpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_socket: Option<String>,

    /// Order in which endpoints are tried
    pub scopes: Vec<String>,

    /// Upper bound for one daemon call, connection included
    pub rpc_timeout_ms: u64,

    /// Timeout for opening one endpoint
    pub connect_timeout_ms: u64,
}

/// Edge transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    /// Timeout for a receiver dialing its sender
    pub connect_timeout_ms: u64,

    /// Timeout for each side of the subscribe handshake
    pub handshake_timeout_ms: u64,

    /// Timeout for writing one packet to one subscriber
    pub send_timeout_ms: u64,

    /// Largest accepted frame in bytes
    pub max_frame_bytes: u32,

    /// Subscribers a sender accepts
    pub max_subscribers: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_socket: "/run/ml-agent/agent.sock".to_string(),
            session_socket: dirs::runtime_dir()
                .map(|d| d.join("ml-agent").join("agent.sock").to_string_lossy().into_owned()),
            scopes: vec!["system".to_string(), "session".to_string()],
            rpc_timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 5_000,
            send_timeout_ms: 5_000,
            max_frame_bytes: MAX_FRAME_SIZE,
            max_subscribers: 32,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl AgentSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl EdgeSettings {
    /// Transport configuration for the built-in TCP edge
    pub fn tcp_edge_config(&self) -> TcpEdgeConfig {
        TcpEdgeConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            max_frame_size: self.max_frame_bytes,
            max_subscribers: self.max_subscribers,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse one TOML file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        for path in search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Agent settings
        if let Ok(val) = std::env::var("ML_SERVICE_SYSTEM_SOCKET") {
            self.agent.system_socket = val;
        }
        if let Ok(val) = std::env::var("ML_SERVICE_SESSION_SOCKET") {
            self.agent.session_socket = if val.is_empty() { None } else { Some(val) };
        }
        if let Ok(val) = std::env::var("ML_SERVICE_AGENT_SCOPES") {
            self.agent.scopes = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("ML_SERVICE_RPC_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.agent.rpc_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ML_SERVICE_AGENT_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.agent.connect_timeout_ms = n;
            }
        }

        // Edge settings
        if let Ok(val) = std::env::var("ML_SERVICE_EDGE_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.edge.connect_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ML_SERVICE_HANDSHAKE_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.edge.handshake_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ML_SERVICE_SEND_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.edge.send_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ML_SERVICE_MAX_FRAME_BYTES") {
            if let Ok(n) = val.parse() {
                self.edge.max_frame_bytes = n;
            }
        }
        if let Ok(val) = std::env::var("ML_SERVICE_MAX_SUBSCRIBERS") {
            if let Ok(n) = val.parse() {
                self.edge.max_subscribers = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("ML_SERVICE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ML_SERVICE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("ML_SERVICE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and environment variables in paths
    fn expand_paths(&mut self) {
        self.agent.system_socket = expand_path(&self.agent.system_socket);
        if let Some(ref socket) = self.agent.session_socket {
            self.agent.session_socket = Some(expand_path(socket));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.system_socket.is_empty() {
            return Err(Error::config_field_invalid(
                "agent.system_socket",
                "system socket path cannot be empty",
            ));
        }
        if self.agent.scopes.is_empty() {
            return Err(Error::config_field_invalid(
                "agent.scopes",
                "at least one bus scope is required",
            ));
        }
        for scope in &self.agent.scopes {
            if BusScope::parse(scope).is_none() {
                return Err(Error::config_field_invalid(
                    "agent.scopes",
                    format!("unknown bus scope '{}', expected system or session", scope),
                ));
            }
        }
        if self.agent.rpc_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "agent.rpc_timeout_ms",
                "rpc timeout must be greater than zero",
            ));
        }

        if self.edge.max_frame_bytes == 0 || self.edge.max_frame_bytes > MAX_FRAME_SIZE {
            return Err(Error::config_field_invalid(
                "edge.max_frame_bytes",
                format!("max frame size must be between 1 and {}", MAX_FRAME_SIZE),
            ));
        }
        if self.edge.send_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "edge.send_timeout_ms",
                "send timeout must be greater than zero",
            ));
        }
        if self.edge.max_subscribers == 0 {
            return Err(Error::config_field_invalid(
                "edge.max_subscribers",
                "a sender must accept at least one subscriber",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "invalid log level '{}', must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Standard configuration locations, in search order
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("ml-service.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("ml-service").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".ml-service").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/ml-service/config.toml"));
    paths
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Write a commented default configuration file, returning its path
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ml-service")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "configuration file already exists: {} (use --force to overwrite)",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    info!(path = %config_path.display(), "Configuration file created");
    Ok(config_path)
}

/// Default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# ML service configuration

[agent]
# Socket of the system-wide ML agent daemon
system_socket = "/run/ml-agent/agent.sock"

# Socket of the per-user daemon (defaults to $XDG_RUNTIME_DIR/ml-agent/agent.sock)
# session_socket = "/run/user/1000/ml-agent/agent.sock"

# Endpoints are tried in this order
scopes = ["system", "session"]

# Upper bound for one daemon call in milliseconds
rpc_timeout_ms = 10000

# Timeout for opening one endpoint in milliseconds
connect_timeout_ms = 2000

[edge]
# Timeout for a receiver dialing its sender in milliseconds
connect_timeout_ms = 10000

# Timeout for each side of the subscribe handshake in milliseconds
handshake_timeout_ms = 5000

# Timeout for writing one packet to one subscriber in milliseconds
send_timeout_ms = 5000

# Largest accepted frame in bytes
max_frame_bytes = 67108864

# Subscribers a sender accepts
max_subscribers = 32

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.ml-service/logs/ml-service.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.agent.system_socket, "/run/ml-agent/agent.sock");
        assert_eq!(config.agent.scopes, vec!["system", "session"]);
        assert_eq!(config.agent.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(config.edge.max_subscribers, 32);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override() {
        env::set_var("ML_SERVICE_RPC_TIMEOUT_MS", "2500");
        env::set_var("ML_SERVICE_AGENT_SCOPES", "session, system");
        env::set_var("ML_SERVICE_MAX_SUBSCRIBERS", "4");

        let mut config = ServiceConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.agent.rpc_timeout_ms, 2500);
        assert_eq!(config.agent.scopes, vec!["session", "system"]);
        assert_eq!(config.edge.max_subscribers, 4);

        env::remove_var("ML_SERVICE_RPC_TIMEOUT_MS");
        env::remove_var("ML_SERVICE_AGENT_SCOPES");
        env::remove_var("ML_SERVICE_MAX_SUBSCRIBERS");
    }

    #[test]
    fn test_validation_rejects_unknown_scope() {
        let mut config = ServiceConfig::default();
        config.agent.scopes = vec!["system".into(), "user".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = ServiceConfig::default();
        config.agent.rpc_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_frames() {
        let mut config = ServiceConfig::default();
        config.edge.max_frame_bytes = MAX_FRAME_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = ServiceConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_file_parses_and_validates() {
        let config: ServiceConfig = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.edge.handshake_timeout_ms, 5000);
    }

    #[test]
    fn test_tcp_edge_config_from_settings() {
        let settings = EdgeSettings {
            connect_timeout_ms: 1500,
            max_subscribers: 2,
            ..Default::default()
        };
        let tcp = settings.tcp_edge_config();
        assert_eq!(tcp.connect_timeout, Duration::from_millis(1500));
        assert_eq!(tcp.max_subscribers, 2);
    }

    #[test]
    fn test_parse_partial_file() {
        let config: ServiceConfig = toml::from_str(
            r#"
[agent]
system_socket = "/tmp/agent.sock"
scopes = ["system"]

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.agent.system_socket, "/tmp/agent.sock");
        assert_eq!(config.agent.scopes, vec!["system"]);
        assert_eq!(config.agent.rpc_timeout_ms, 10_000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        init_config(Some(path_str), false).unwrap();
        assert!(init_config(Some(path_str), false).is_err());
        assert!(init_config(Some(path_str), true).is_ok());
    }
}
