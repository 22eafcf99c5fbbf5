//! Transport registry
//!
//! Connection kinds, node roles, and the factory that turns a kind into a
//! transport handle.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::tcp::{TcpEdge, TcpEdgeConfig};
use super::SharedTransport;

// ─────────────────────────────────────────────────────────────────
// Connect Kind
// ─────────────────────────────────────────────────────────────────

/// Pub/sub transport families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectKind {
    /// Plain TCP streams
    Tcp,
    /// TCP data plane with broker-based discovery
    Hybrid,
    /// MQTT broker
    Mqtt,
    /// AI pub/sub over AITT
    Aitt,
    /// Unrecognized or unset
    Unknown,
}

impl ConnectKind {
    /// Get all recognized kinds
    pub fn all() -> &'static [ConnectKind] {
        &[
            ConnectKind::Tcp,
            ConnectKind::Hybrid,
            ConnectKind::Mqtt,
            ConnectKind::Aitt,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectKind::Tcp => "TCP",
            ConnectKind::Hybrid => "HYBRID",
            ConnectKind::Mqtt => "MQTT",
            ConnectKind::Aitt => "AITT",
            ConnectKind::Unknown => "UNKNOWN",
        }
    }

    /// Check if this crate ships a transport for the kind
    pub fn is_built_in(&self) -> bool {
        matches!(self, ConnectKind::Tcp)
    }

    /// Parse case-insensitively. Anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => ConnectKind::Tcp,
            "HYBRID" => ConnectKind::Hybrid,
            "MQTT" => ConnectKind::Mqtt,
            "AITT" => ConnectKind::Aitt,
            _ => ConnectKind::Unknown,
        }
    }
}

impl std::fmt::Display for ConnectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Node Role
// ─────────────────────────────────────────────────────────────────

/// Which side of the pub/sub link a node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Publishes data, accepts subscribers
    Sender,
    /// Subscribes by dialing a sender
    Receiver,
    Unknown,
}

impl NodeRole {
    pub fn name(&self) -> &'static str {
        match self {
            NodeRole::Sender => "remote_sender",
            NodeRole::Receiver => "remote_receiver",
            NodeRole::Unknown => "unknown",
        }
    }

    /// Parse case-insensitively. Anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "remote_sender" => NodeRole::Sender,
            "remote_receiver" => NodeRole::Receiver,
            _ => NodeRole::Unknown,
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Transport Factory
// ─────────────────────────────────────────────────────────────────

/// Creates transport handles for the connection manager
pub trait TransportFactory: Send + Sync {
    fn create(&self, kind: ConnectKind, role: NodeRole) -> Result<SharedTransport>;
}

/// Factory backed by the transports this crate ships
#[derive(Debug, Clone, Default)]
pub struct DefaultTransportFactory {
    tcp: TcpEdgeConfig,
}

impl DefaultTransportFactory {
    pub fn new(tcp: TcpEdgeConfig) -> Self {
        Self { tcp }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: ConnectKind, role: NodeRole) -> Result<SharedTransport> {
        if role == NodeRole::Unknown {
            return Err(Error::invalid_parameter("node-type", "node role is unknown"));
        }
        match kind {
            ConnectKind::Tcp => Ok(Arc::new(TcpEdge::new(role, self.tcp.clone()))),
            ConnectKind::Hybrid | ConnectKind::Mqtt | ConnectKind::Aitt => Err(
                Error::NotSupported(format!("{} transport is not built in", kind)),
            ),
            ConnectKind::Unknown => Err(Error::invalid_parameter(
                "connect-type",
                "connection type is unknown",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_connect_kind_parse_ignores_case() {
        assert_eq!(ConnectKind::parse("tcp"), ConnectKind::Tcp);
        assert_eq!(ConnectKind::parse("TCP"), ConnectKind::Tcp);
        assert_eq!(ConnectKind::parse("Tcp"), ConnectKind::Tcp);
        assert_eq!(ConnectKind::parse("mqtt"), ConnectKind::Mqtt);
        assert_eq!(ConnectKind::parse("Hybrid"), ConnectKind::Hybrid);
        assert_eq!(ConnectKind::parse("aitt"), ConnectKind::Aitt);
        assert_eq!(ConnectKind::parse("udp"), ConnectKind::Unknown);
    }

    #[test]
    fn test_node_role_parse() {
        assert_eq!(NodeRole::parse("remote_sender"), NodeRole::Sender);
        assert_eq!(NodeRole::parse("REMOTE_RECEIVER"), NodeRole::Receiver);
        assert_eq!(NodeRole::parse("sender"), NodeRole::Unknown);
    }

    #[test]
    fn test_only_tcp_is_built_in() {
        let built_in: Vec<_> = ConnectKind::all().iter().filter(|k| k.is_built_in()).collect();
        assert_eq!(built_in, vec![&ConnectKind::Tcp]);
    }

    #[tokio::test]
    async fn test_factory_creates_tcp() {
        let factory = DefaultTransportFactory::default();
        let transport = factory.create(ConnectKind::Tcp, NodeRole::Sender).unwrap();
        assert_eq!(transport.kind(), ConnectKind::Tcp);
        assert_eq!(transport.role(), NodeRole::Sender);
    }

    #[test]
    fn test_factory_rejects_external_kinds() {
        let factory = DefaultTransportFactory::default();
        for kind in [ConnectKind::Hybrid, ConnectKind::Mqtt, ConnectKind::Aitt] {
            let err = factory.create(kind, NodeRole::Receiver).err().unwrap();
            assert!(matches!(err, Error::NotSupported(_)));
        }
        let err = factory.create(ConnectKind::Unknown, NodeRole::Sender).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::InvalidParameter);
    }
}
