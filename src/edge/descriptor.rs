//! Connection descriptor
//!
//! Resolves an option bag into the settings for one edge connection.

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::options::{OptionStore, OptionValue};

use super::{ConnectKind, NodeRole};

pub const KEY_HOST: &str = "host";
pub const KEY_PORT: &str = "port";
pub const KEY_DEST_HOST: &str = "dest-host";
pub const KEY_DEST_PORT: &str = "dest-port";
pub const KEY_TOPIC: &str = "topic";
pub const KEY_CONNECT_TYPE: &str = "connect-type";
pub const KEY_NODE_TYPE: &str = "node-type";

const DEFAULT_HOST: &str = "localhost";

/// Settings for one edge connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub dest_host: String,
    pub dest_port: u16,
    pub topic: Option<String>,
    pub connect_kind: ConnectKind,
    pub role: NodeRole,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            dest_host: DEFAULT_HOST.to_string(),
            dest_port: 0,
            topic: None,
            connect_kind: ConnectKind::Unknown,
            role: NodeRole::Unknown,
        }
    }
}

/// A key whose value could not be used. Building continues past these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorIssue {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for DescriptorIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = '{}': {}", self.key, self.value, self.reason)
    }
}

impl ConnectionDescriptor {
    /// Build from an option bag. Unrecognized keys are ignored. Every issue
    /// is also logged at warn level.
    pub fn from_options(options: &OptionStore) -> (Self, Vec<DescriptorIssue>) {
        let mut desc = Self::default();
        let mut issues = Vec::new();

        if let Some(v) = read_str(options, KEY_HOST, &mut issues) {
            desc.host = v.to_string();
        }
        if let Some(v) = read_port(options, KEY_PORT, &mut issues) {
            desc.port = v;
        }
        if let Some(v) = read_str(options, KEY_DEST_HOST, &mut issues) {
            desc.dest_host = v.to_string();
        }
        if let Some(v) = read_port(options, KEY_DEST_PORT, &mut issues) {
            desc.dest_port = v;
        }
        if let Some(v) = read_str(options, KEY_TOPIC, &mut issues) {
            desc.topic = Some(v.to_string());
        }
        if let Some(v) = read_str(options, KEY_CONNECT_TYPE, &mut issues) {
            desc.connect_kind = ConnectKind::parse(v);
            if desc.connect_kind == ConnectKind::Unknown {
                issues.push(DescriptorIssue {
                    key: KEY_CONNECT_TYPE,
                    value: v.to_string(),
                    reason: "expected one of TCP, HYBRID, MQTT, AITT".to_string(),
                });
            }
        }
        if let Some(v) = read_str(options, KEY_NODE_TYPE, &mut issues) {
            desc.role = NodeRole::parse(v);
            if desc.role == NodeRole::Unknown {
                issues.push(DescriptorIssue {
                    key: KEY_NODE_TYPE,
                    value: v.to_string(),
                    reason: "expected remote_sender or remote_receiver".to_string(),
                });
            }
        }

        for issue in &issues {
            warn!(key = issue.key, value = %issue.value, reason = %issue.reason, "Ignoring edge option");
        }

        (desc, issues)
    }

    /// Check the invariants that must hold before a handle is created
    pub fn validate(&self) -> Result<()> {
        if self.connect_kind == ConnectKind::Unknown {
            return Err(Error::invalid_parameter(
                KEY_CONNECT_TYPE,
                "connection type is unknown",
            ));
        }
        if self.role == NodeRole::Unknown {
            return Err(Error::invalid_parameter(KEY_NODE_TYPE, "node role is unknown"));
        }
        if self.role == NodeRole::Receiver {
            if self.dest_host.is_empty() {
                return Err(Error::invalid_parameter(
                    KEY_DEST_HOST,
                    "a receiver needs a destination host",
                ));
            }
            if self.dest_port == 0 {
                return Err(Error::invalid_parameter(
                    KEY_DEST_PORT,
                    "a receiver needs a non-zero destination port",
                ));
            }
        }
        Ok(())
    }

    pub fn dest_addr(&self) -> String {
        format!("{}:{}", self.dest_host, self.dest_port)
    }
}

fn read_str<'a>(
    options: &'a OptionStore,
    key: &'static str,
    issues: &mut Vec<DescriptorIssue>,
) -> Option<&'a str> {
    let value = options.get(key)?;
    match value.as_str() {
        Some(s) => Some(s),
        None => {
            issues.push(wrong_type(key, value, "string"));
            None
        }
    }
}

fn read_port(
    options: &OptionStore,
    key: &'static str,
    issues: &mut Vec<DescriptorIssue>,
) -> Option<u16> {
    let value = options.get(key)?;
    match value.as_uint() {
        Some(n) => match u16::try_from(n) {
            Ok(port) => Some(port),
            Err(_) => {
                issues.push(DescriptorIssue {
                    key,
                    value: value.to_string(),
                    reason: "port out of range".to_string(),
                });
                None
            }
        },
        None => {
            issues.push(wrong_type(key, value, "unsigned integer"));
            None
        }
    }
}

fn wrong_type(key: &'static str, value: &OptionValue, expected: &str) -> DescriptorIssue {
    DescriptorIssue {
        key,
        value: value.to_string(),
        reason: format!("expected {}, got {}", expected, value.type_name()),
    }
}
