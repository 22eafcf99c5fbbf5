//! Configuration system tests
//!
//! Tests configuration loading and validation through the public API

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use ml_service::config::{self, ServiceConfig};
use ml_service::error::{Error, ErrorCode};
use ml_service::framing::MAX_FRAME_SIZE;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    let cfg = ServiceConfig::from_file(&fixture.config_path).unwrap();
    assert_eq!(cfg.agent.system_socket, "/run/ml-agent/agent.sock");
    assert_eq!(cfg.agent.scopes, vec!["system", "session"]);
    assert_eq!(cfg.agent.rpc_timeout(), Duration::from_secs(10));
    assert_eq!(cfg.edge.max_frame_bytes, MAX_FRAME_SIZE);
    cfg.validate().unwrap();
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[agent]
system_socket = "/tmp/ml-agent/system.sock"
session_socket = "/tmp/ml-agent/session.sock"
scopes = ["session", "system"]
rpc_timeout_ms = 2500
connect_timeout_ms = 500

[edge]
connect_timeout_ms = 3000
handshake_timeout_ms = 1000
send_timeout_ms = 750
max_frame_bytes = 65536
max_subscribers = 4

[logging]
level = "debug"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );

    let cfg = ServiceConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(cfg.agent.system_socket, "/tmp/ml-agent/system.sock");
    assert_eq!(cfg.agent.session_socket.as_deref(), Some("/tmp/ml-agent/session.sock"));
    assert_eq!(cfg.agent.scopes, vec!["session", "system"]);
    assert_eq!(cfg.agent.rpc_timeout(), Duration::from_millis(2500));

    let tcp = cfg.edge.tcp_edge_config();
    assert_eq!(tcp.connect_timeout, Duration::from_millis(3000));
    assert_eq!(tcp.handshake_timeout, Duration::from_millis(1000));
    assert_eq!(tcp.send_timeout, Duration::from_millis(750));
    assert_eq!(tcp.max_frame_size, 65536);
    assert_eq!(tcp.max_subscribers, 4);

    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.json_format);
}

#[test]
fn test_generated_default_config_is_valid() {
    let fixture = ConfigFixture::new();
    fixture.write_config(&config::generate_default_config());

    let cfg = ServiceConfig::from_file(&fixture.config_path).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.agent.scopes, vec!["system", "session"]);
}

#[test]
fn test_serialized_config_loads_back() {
    let fixture = ConfigFixture::new();
    let mut original = ServiceConfig::default();
    original.agent.scopes = vec!["session".to_string()];
    original.edge.max_subscribers = 7;
    fixture.write_config(&toml::to_string_pretty(&original).unwrap());

    let loaded = ServiceConfig::from_file(&fixture.config_path).unwrap();
    assert_eq!(loaded.agent.scopes, vec!["session"]);
    assert_eq!(loaded.edge.max_subscribers, 7);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

fn load_err(content: &str) -> Error {
    let fixture = ConfigFixture::new();
    fixture.write_config(content);
    ServiceConfig::load(Some(fixture.path())).unwrap_err()
}

#[test]
fn test_unknown_scope_rejected() {
    let err = load_err("[agent]\nscopes = [\"system\", \"galaxy\"]\n");
    assert_eq!(err.code(), ErrorCode::ConfigValidation);
    assert!(err.to_string().contains("galaxy"));
}

#[test]
fn test_empty_scopes_rejected() {
    let err = load_err("[agent]\nscopes = []\n");
    assert_eq!(err.code(), ErrorCode::ConfigValidation);
}

#[test]
fn test_zero_rpc_timeout_rejected() {
    let err = load_err("[agent]\nrpc_timeout_ms = 0\n");
    assert!(err.to_string().contains("rpc timeout"));
}

#[test]
fn test_oversized_frame_limit_rejected() {
    let err = load_err(&format!("[edge]\nmax_frame_bytes = {}\n", MAX_FRAME_SIZE as u64 + 1));
    assert_eq!(err.code(), ErrorCode::ConfigValidation);
}

#[test]
fn test_zero_send_timeout_rejected() {
    let err = load_err("[edge]\nsend_timeout_ms = 0\n");
    assert!(err.to_string().contains("send timeout"));
}

#[test]
fn test_zero_subscribers_rejected() {
    let err = load_err("[edge]\nmax_subscribers = 0\n");
    assert!(err.to_string().contains("subscriber"));
}

#[test]
fn test_invalid_log_level() {
    let err = load_err("[logging]\nlevel = \"verbose\"\n");
    assert!(err.to_string().contains("verbose"));
}

#[test]
fn test_malformed_toml() {
    let err = load_err("[agent\nsystem_socket = ");
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}

#[test]
fn test_wrong_value_type() {
    let err = load_err("[agent]\nrpc_timeout_ms = \"soon\"\n");
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}

#[test]
fn test_explicit_path_missing() {
    let err = ServiceConfig::load(Some("/nonexistent/ml-service/config.toml")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigNotFound);
}

// ─────────────────────────────────────────────────────────────────
// init_config
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_init_config_creates_parents_and_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a").join("b").join("config.toml");
    let path_str = path.to_str().unwrap();

    let written = config::init_config(Some(path_str), false).unwrap();
    assert_eq!(written, path);
    assert!(fs::read_to_string(&path).unwrap().contains("[agent]"));

    fs::write(&path, "# edited\n").unwrap();
    assert!(config::init_config(Some(path_str), false).is_err());
    assert!(fs::read_to_string(&path).unwrap().starts_with("# edited"));

    config::init_config(Some(path_str), true).unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("[agent]"));
}

#[test]
fn test_search_paths_order() {
    let paths = config::search_paths();
    assert_eq!(paths.first(), Some(&PathBuf::from("ml-service.toml")));
    assert_eq!(paths.last(), Some(&PathBuf::from("/etc/ml-service/config.toml")));
}
