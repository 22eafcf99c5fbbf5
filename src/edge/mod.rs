//! Edge pub/sub transport
//!
//! Transport traits and backends, the connection descriptor built from an
//! option bag, and the connection manager that drives a handle to ACTIVE.

mod connection;
mod descriptor;
mod mock;
mod registry;
mod tcp;
mod traits;

pub use connection::{ConnectionStage, EdgeConnection};
pub use descriptor::{
    ConnectionDescriptor, DescriptorIssue, KEY_CONNECT_TYPE, KEY_DEST_HOST, KEY_DEST_PORT,
    KEY_HOST, KEY_NODE_TYPE, KEY_PORT, KEY_TOPIC,
};
pub use mock::{MockEdge, MockEdgeConfig, MockTransportFactory};
pub use registry::{ConnectKind, DefaultTransportFactory, NodeRole, TransportFactory};
pub use tcp::{TcpEdge, TcpEdgeConfig};
pub use traits::{
    Delivery, EdgeData, EdgeEvent, EdgeEventHandler, EdgeInfoKey, EdgeTransport, HandlerSlot,
    SharedTransport,
};
