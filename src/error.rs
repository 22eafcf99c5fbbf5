//! Error types for ml-service
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - A coarse category per error (invalid parameter, transport, protocol, ...)
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ml-service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Transport errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ConnectionLost = 302,
    EdgeStageFailed = 303,
    ServiceUnavailable = 310,

    // Protocol errors (4xx)
    ProtocolMalformed = 400,
    ProtocolUnexpected = 401,
    UnknownService = 410,
    UnsupportedService = 411,

    // Daemon errors (5xx)
    DaemonStatus = 500,
    RpcTimeout = 501,

    // Usage errors (6xx)
    InvalidParameter = 600,
    WrongHandle = 601,
    HandleReleased = 602,

    // Resource errors (7xx)
    OutOfMemory = 700,

    // Internal errors (9xx)
    InternalError = 900,
    NotSupported = 902,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Transport errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Daemon errors
            600..=699 => 60, // Usage errors
            700..=799 => 70, // Resource errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse failure category callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidParameter,
    PermissionDenied,
    ServiceUnavailable,
    TransportError,
    OutOfMemory,
    ProtocolError,
    Timeout,
    Daemon,
    Config,
    Internal,
}

/// Main error type for ml-service
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// A path could not be inspected
    #[error("Permission denied: cannot access {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // Usage Errors
    // ─────────────────────────────────────────────────────────────

    /// Argument rejected before any I/O
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// Operation called on a handle of the wrong kind
    #[error("Operation '{operation}' is not valid on a {kind} service handle")]
    WrongHandle {
        operation: &'static str,
        kind: &'static str,
    },

    /// Operation called on a released handle
    #[error("Operation '{operation}' called on a released service handle")]
    HandleReleased { operation: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────

    /// Connection failed
    #[error("Failed to connect to {target}: {message}")]
    ConnectionFailed { target: String, message: String },

    /// Connection timeout
    #[error("Connection to {target} timed out after {timeout_ms}ms")]
    ConnectionTimeout { target: String, timeout_ms: u64 },

    /// Connection lost
    #[error("Lost connection: {message}")]
    ConnectionLost { message: String },

    /// A step of edge connection setup failed
    #[error("Edge connection failed while {stage}: {source}")]
    EdgeStage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// No agent endpoint answered
    #[error("ML agent service unavailable: {reason}")]
    ServiceUnavailable {
        reason: String,
        #[source]
        last: Option<Box<Error>>,
    },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed message or document
    #[error("Malformed protocol message: {message}")]
    ProtocolMalformed { message: String },

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message that is well formed but not expected here
    #[error("Unexpected protocol message: expected {expected}, got {actual}")]
    ProtocolUnexpected { expected: String, actual: String },

    /// Service type tag that is not recognized at all
    #[error("Unknown service type '{service_type}'")]
    UnknownService { service_type: String },

    /// Service type tag that is recognized but not handled
    #[error("Service type '{service_type}' is not supported")]
    UnsupportedService { service_type: String },

    // ─────────────────────────────────────────────────────────────
    // Daemon Errors
    // ─────────────────────────────────────────────────────────────

    /// Daemon answered with a non-zero status
    #[error("ML agent call '{method}' failed with status {status}")]
    Daemon { method: String, status: i32 },

    /// Daemon call did not complete in time
    #[error("ML agent call '{method}' timed out after {timeout_ms}ms")]
    RpcTimeout { method: String, timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Resource Errors
    // ─────────────────────────────────────────────────────────────

    /// Allocation or capacity limit hit
    #[error("Out of memory: {message}")]
    OutOfMemory { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Feature not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::PermissionDenied { .. } => ErrorCode::IoPermission,

            Error::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Error::WrongHandle { .. } => ErrorCode::WrongHandle,
            Error::HandleReleased { .. } => ErrorCode::HandleReleased,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::EdgeStage { .. } => ErrorCode::EdgeStageFailed,
            Error::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,
            Error::Json(_) => ErrorCode::ProtocolMalformed,
            Error::ProtocolUnexpected { .. } => ErrorCode::ProtocolUnexpected,
            Error::UnknownService { .. } => ErrorCode::UnknownService,
            Error::UnsupportedService { .. } => ErrorCode::UnsupportedService,

            Error::Daemon { .. } => ErrorCode::DaemonStatus,
            Error::RpcTimeout { .. } => ErrorCode::RpcTimeout,

            Error::OutOfMemory { .. } => ErrorCode::OutOfMemory,

            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get the coarse category. Edge stage failures report the category
    /// of the step that failed.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigNotFound { .. }
            | Error::ConfigParse { .. }
            | Error::ConfigValidation { .. }
            | Error::Toml(_) => ErrorCategory::Config,

            Error::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::PermissionDenied
            }
            Error::Io(_) | Error::IoRead { .. } | Error::IoWrite { .. } => {
                ErrorCategory::TransportError
            }

            Error::InvalidParameter { .. }
            | Error::WrongHandle { .. }
            | Error::HandleReleased { .. } => ErrorCategory::InvalidParameter,

            Error::ConnectionFailed { .. } | Error::ConnectionLost { .. } => {
                ErrorCategory::TransportError
            }
            Error::ConnectionTimeout { .. } | Error::RpcTimeout { .. } => ErrorCategory::Timeout,
            Error::EdgeStage { source, .. } => source.category(),
            Error::ServiceUnavailable { .. } => ErrorCategory::ServiceUnavailable,

            Error::ProtocolMalformed { .. }
            | Error::Json(_)
            | Error::ProtocolUnexpected { .. }
            | Error::UnknownService { .. }
            | Error::UnsupportedService { .. } => ErrorCategory::ProtocolError,

            Error::Daemon { .. } => ErrorCategory::Daemon,
            Error::OutOfMemory { .. } => ErrorCategory::OutOfMemory,
            Error::NotSupported(_) | Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout { .. }
            | Error::ConnectionLost { .. }
            | Error::ServiceUnavailable { .. }
            | Error::RpcTimeout { .. }
            | Error::Io(_) => true,
            Error::EdgeStage { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'ml-service config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'ml-service config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::ServiceUnavailable { .. } => Some(
                "Check that the ML agent daemon is running and that [agent] socket paths point at it."
            ),
            Error::RpcTimeout { .. } => Some(
                "The ML agent did not answer in time. Raise 'rpc_timeout_ms' if the daemon is busy."
            ),
            Error::ConnectionFailed { .. } => Some(
                "Verify the peer address and port, and that the remote node is started."
            ),
            Error::ConnectionTimeout { .. } => Some(
                "The remote node may be down or unreachable. Check your firewall settings."
            ),

            Error::UnknownService { .. } => Some(
                "Valid service types are model_raw, model_url, pipeline_raw and pipeline_url."
            ),
            Error::UnsupportedService { .. } => Some(
                "Only pipeline_raw services are handled by this receiver."
            ),

            Error::PermissionDenied { .. } => Some(
                "Check that the parent directory exists and is readable."
            ),
            Error::WrongHandle { .. } => Some(
                "Pipeline operations need a handle from 'launch'; register and send need a remote handle."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a connection lost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Error::ConnectionLost {
            message: message.into(),
        }
    }

    /// Wrap the failure of one edge setup step
    pub fn edge_stage(stage: &'static str, source: Error) -> Self {
        Error::EdgeStage {
            stage,
            source: Box::new(source),
        }
    }

    /// Create a malformed protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }

    /// Create a daemon status error
    pub fn daemon(method: impl Into<String>, status: i32) -> Self {
        Error::Daemon {
            method: method.into(),
            status,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::ServiceUnavailable.as_str(), "E310");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::ServiceUnavailable.exit_code(), 30);
        assert_eq!(ErrorCode::UnknownService.exit_code(), 40);
        assert_eq!(ErrorCode::DaemonStatus.exit_code(), 50);
        assert_eq!(ErrorCode::InvalidParameter.exit_code(), 60);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::invalid_parameter("name", "empty").category(),
            ErrorCategory::InvalidParameter
        );
        assert_eq!(
            Error::HandleReleased { operation: "register" }.category(),
            ErrorCategory::InvalidParameter
        );
        assert_eq!(Error::protocol("bad").category(), ErrorCategory::ProtocolError);
        assert_eq!(
            Error::UnknownService { service_type: "bogus".into() }.category(),
            ErrorCategory::ProtocolError
        );
        assert_eq!(Error::daemon("launch_pipeline", -5).category(), ErrorCategory::Daemon);
    }

    #[test]
    fn test_unknown_and_unsupported_are_distinct() {
        let unknown = Error::UnknownService { service_type: "bogus".into() };
        let unsupported = Error::UnsupportedService { service_type: "model_url".into() };
        assert_ne!(unknown.code(), unsupported.code());
    }

    #[test]
    fn test_edge_stage_keeps_source_category() {
        let err = Error::edge_stage(
            "connecting",
            Error::connection_failed("127.0.0.1:9000", "refused"),
        );
        assert_eq!(err.code(), ErrorCode::EdgeStageFailed);
        assert_eq!(err.category(), ErrorCategory::TransportError);
        assert!(err.to_string().contains("connecting"));
        assert!(err.is_retryable());

        let err = Error::edge_stage("creating", Error::NotSupported("MQTT".into()));
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::connection_failed("peer", "test").is_retryable());
        assert!(Error::RpcTimeout { method: "get_model".into(), timeout_ms: 10 }.is_retryable());
        assert!(!Error::config_not_found("/test").is_retryable());
        assert!(!Error::daemon("set_pipeline", 1).is_retryable());
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::ServiceUnavailable { reason: "no socket".into(), last: None };
        assert!(err.suggestion().unwrap().contains("socket"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/config.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::daemon("start_pipeline", 3);
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E500]"));
        assert!(formatted.contains("start_pipeline"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();

        assert_eq!(err.code(), ErrorCode::IoPermission);
        assert_eq!(err.category(), ErrorCategory::PermissionDenied);
    }
}
