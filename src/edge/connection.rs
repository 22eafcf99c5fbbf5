//! Edge connection manager
//!
//! Drives one transport handle through
//! create -> bind events -> configure -> start -> (receiver) connect.
//! A handle that fails any step is released before the error is returned.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::{
    ConnectionDescriptor, EdgeData, EdgeEventHandler, EdgeInfoKey, NodeRole, SharedTransport,
    TransportFactory,
};

/// Setup progress of an [`EdgeConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStage {
    Uncreated,
    Created,
    EventBound,
    Configured,
    Started,
    Connected,
    Active,
}

impl ConnectionStage {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionStage::Uncreated => "uncreated",
            ConnectionStage::Created => "created",
            ConnectionStage::EventBound => "event_bound",
            ConnectionStage::Configured => "configured",
            ConnectionStage::Started => "started",
            ConnectionStage::Connected => "connected",
            ConnectionStage::Active => "active",
        }
    }

    /// The step taken to leave this stage, used in error messages
    fn next_step(&self) -> &'static str {
        match self {
            ConnectionStage::Uncreated => "creating the handle",
            ConnectionStage::Created => "binding the event handler",
            ConnectionStage::EventBound => "configuring",
            ConnectionStage::Configured => "starting",
            ConnectionStage::Started => "connecting",
            ConnectionStage::Connected | ConnectionStage::Active => "activating",
        }
    }
}

impl fmt::Display for ConnectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An ACTIVE edge connection owning its transport handle
pub struct EdgeConnection {
    transport: SharedTransport,
    descriptor: ConnectionDescriptor,
    stage: ConnectionStage,
}

impl EdgeConnection {
    /// Validate the descriptor and bring a new handle to ACTIVE.
    ///
    /// Invalid descriptors fail before anything is created. On any later
    /// failure the handle is released and the error names the failed step.
    pub async fn establish(
        descriptor: ConnectionDescriptor,
        factory: &dyn TransportFactory,
        handler: Arc<dyn EdgeEventHandler>,
    ) -> Result<Self> {
        descriptor.validate()?;

        let transport = factory
            .create(descriptor.connect_kind, descriptor.role)
            .map_err(|e| Error::edge_stage(ConnectionStage::Uncreated.next_step(), e))?;

        let mut conn = EdgeConnection {
            transport,
            descriptor,
            stage: ConnectionStage::Created,
        };

        if let Err(e) = conn.bring_up(handler).await {
            let failed = conn.stage.next_step();
            warn!(step = failed, error = %e, "Edge connection setup failed, releasing handle");
            if let Err(release_err) = conn.transport.release().await {
                debug!(error = %release_err, "Release after failed setup also failed");
            }
            return Err(Error::edge_stage(failed, e));
        }

        conn.stage = ConnectionStage::Active;
        info!(
            kind = %conn.descriptor.connect_kind,
            role = %conn.descriptor.role,
            topic = ?conn.descriptor.topic,
            "Edge connection active"
        );
        Ok(conn)
    }

    async fn bring_up(&mut self, handler: Arc<dyn EdgeEventHandler>) -> Result<()> {
        self.transport.set_event_handler(handler).await?;
        self.stage = ConnectionStage::EventBound;

        self.configure()?;
        self.stage = ConnectionStage::Configured;

        self.transport.start().await?;
        self.stage = ConnectionStage::Started;

        if self.descriptor.role == NodeRole::Receiver {
            self.transport
                .connect(&self.descriptor.dest_host, self.descriptor.dest_port)
                .await?;
            self.stage = ConnectionStage::Connected;
        }
        Ok(())
    }

    fn configure(&self) -> Result<()> {
        let d = &self.descriptor;
        let t = &self.transport;
        t.set_info(EdgeInfoKey::Host, &d.host)?;
        t.set_info(EdgeInfoKey::Port, &d.port.to_string())?;
        if let Some(ref topic) = d.topic {
            t.set_info(EdgeInfoKey::Topic, topic)?;
        }
        t.set_info(EdgeInfoKey::DestHost, &d.dest_host)?;
        t.set_info(EdgeInfoKey::DestPort, &d.dest_port.to_string())?;
        Ok(())
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn role(&self) -> NodeRole {
        self.descriptor.role
    }

    pub fn stage(&self) -> ConnectionStage {
        self.stage
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub async fn send(&self, data: EdgeData) -> Result<()> {
        self.transport.send(data).await
    }

    pub fn connected_peers(&self) -> usize {
        self.transport.connected_peers()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Release the handle. Waits for an in-flight callback to finish.
    pub async fn release(self) -> Result<()> {
        self.transport.release().await
    }
}
