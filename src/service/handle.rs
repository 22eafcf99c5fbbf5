//! Caller-facing service handles
//!
//! One handle type covers a registered edge participant, a launched daemon
//! pipeline, and a reserved model variant. Each operation is valid on one
//! variant only; the others answer with [`Error::WrongHandle`].

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{AgentClient, PipelineState};
use crate::edge::{ConnectionDescriptor, EdgeConnection, EdgeData, NodeRole, TransportFactory};
use crate::error::{Error, Result};
use crate::options::{OptionStore, OptionValue};

use super::{
    EventDispatcher, ServiceEnvelope, ServiceRouter, ServiceType, SERVICE_KEY_KEY,
    SERVICE_TYPE_KEY,
};

// ─────────────────────────────────────────────────────────────────
// Remote Service
// ─────────────────────────────────────────────────────────────────

/// A live edge participant
pub struct RemoteService {
    connection: Option<EdgeConnection>,
    role: NodeRole,
}

impl RemoteService {
    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    fn live(&self, operation: &'static str) -> Result<&EdgeConnection> {
        self.connection
            .as_ref()
            .ok_or(Error::HandleReleased { operation })
    }

    /// Publish `payload` as a service envelope. Arguments are checked before
    /// the transport is touched.
    pub async fn register(&self, service_type: ServiceType, service_key: &str, payload: &[u8]) -> Result<()> {
        let conn = self.live("register")?;
        if service_key.is_empty() {
            return Err(Error::invalid_parameter(SERVICE_KEY_KEY, "must not be empty"));
        }
        if payload.is_empty() {
            return Err(Error::invalid_parameter("payload", "must not be empty"));
        }

        let envelope = ServiceEnvelope::new(service_type, service_key, payload);
        conn.send(envelope.to_edge_data()).await?;
        info!(service_type = %service_type, key = service_key, bytes = payload.len(), "Service registered with remote peers");
        Ok(())
    }

    /// `register` with the type and key read from an option bag
    pub async fn register_with_options(&self, options: &OptionStore, payload: &[u8]) -> Result<()> {
        self.live("register")?;
        let service_type = options
            .get_str(SERVICE_TYPE_KEY)
            .ok_or_else(|| Error::invalid_parameter(SERVICE_TYPE_KEY, "missing or not a string"))?;
        let service_key = options
            .get_str(SERVICE_KEY_KEY)
            .ok_or_else(|| Error::invalid_parameter(SERVICE_KEY_KEY, "missing or not a string"))?;

        let kind = ServiceType::parse(service_type);
        if kind == ServiceType::Unknown {
            return Err(Error::invalid_parameter(
                SERVICE_TYPE_KEY,
                format!("unrecognized service type '{}'", service_type),
            ));
        }
        self.register(kind, service_key, payload).await
    }

    /// Send one packet with `payload` and every scalar entry of `info` as
    /// metadata
    pub async fn send(&self, payload: &[u8], info: &OptionStore) -> Result<()> {
        let conn = self.live("send")?;
        if payload.is_empty() {
            return Err(Error::invalid_parameter("payload", "must not be empty"));
        }

        let mut data = EdgeData::new();
        data.add_payload(payload);
        for (key, value) in info.iter() {
            if let OptionValue::Custom(_) = value {
                return Err(Error::invalid_parameter(
                    key,
                    "custom values cannot be sent as packet metadata",
                ));
            }
            data.set_info(key, value.to_string());
        }
        conn.send(data).await
    }

    pub fn connected_peers(&self) -> usize {
        self.connection.as_ref().map_or(0, EdgeConnection::connected_peers)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().and_then(EdgeConnection::local_addr)
    }

    /// Release the transport, waiting for an in-flight callback. Idempotent.
    pub async fn release(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(conn) => {
                conn.release().await?;
                debug!(role = %self.role, "Remote service released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Pipeline Server
// ─────────────────────────────────────────────────────────────────

/// A pipeline instance launched by the ML agent
pub struct PipelineServer {
    id: i64,
    name: String,
    agent: Arc<AgentClient>,
    released: bool,
}

impl PipelineServer {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn live(&self, operation: &'static str) -> Result<()> {
        if self.released {
            return Err(Error::HandleReleased { operation });
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.live("start")?;
        self.agent.start_pipeline(self.id).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.live("stop")?;
        self.agent.stop_pipeline(self.id).await
    }

    pub async fn state(&self) -> Result<PipelineState> {
        self.live("state")?;
        self.agent.get_pipeline_state(self.id).await
    }

    /// Destroy the daemon instance; the handle is released on success
    pub async fn destroy(&mut self) -> Result<()> {
        self.live("destroy")?;
        self.agent.destroy_pipeline(self.id).await?;
        self.released = true;
        info!(id = self.id, name = %self.name, "Pipeline destroyed");
        Ok(())
    }

    /// Drop local state only; the daemon instance keeps running
    pub fn release(&mut self) {
        self.released = true;
    }
}

// ─────────────────────────────────────────────────────────────────
// Model Server
// ─────────────────────────────────────────────────────────────────

/// Reserved: a model served by name. Carries no operations yet.
pub struct ModelServer {
    name: String,
    released: bool,
}

impl ModelServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

// ─────────────────────────────────────────────────────────────────
// Tagged Handle
// ─────────────────────────────────────────────────────────────────

pub enum MlService {
    Remote(RemoteService),
    Pipeline(PipelineServer),
    Model(ModelServer),
}

impl MlService {
    /// Build an ACTIVE edge participant from an option bag.
    ///
    /// Descriptor issues are logged; the resulting descriptor must still
    /// validate. Inbound data is routed to `agent`.
    pub async fn create_remote(
        options: &OptionStore,
        factory: &dyn TransportFactory,
        agent: Arc<AgentClient>,
    ) -> Result<Self> {
        let dispatcher = EventDispatcher::new(ServiceRouter::new(agent));
        Self::create_remote_with(options, factory, dispatcher).await
    }

    /// `create_remote` with a caller-built dispatcher
    pub async fn create_remote_with(
        options: &OptionStore,
        factory: &dyn TransportFactory,
        dispatcher: EventDispatcher,
    ) -> Result<Self> {
        let (descriptor, issues) = ConnectionDescriptor::from_options(options);
        if !issues.is_empty() {
            debug!(count = issues.len(), "Connection options had issues");
        }
        let role = descriptor.role;
        let connection = EdgeConnection::establish(descriptor, factory, Arc::new(dispatcher)).await?;

        Ok(MlService::Remote(RemoteService {
            connection: Some(connection),
            role,
        }))
    }

    /// Launch the stored pipeline `name` on the ML agent
    pub async fn launch_pipeline(agent: Arc<AgentClient>, name: &str) -> Result<Self> {
        let id = agent.launch_pipeline(name).await?;
        Ok(MlService::Pipeline(PipelineServer {
            id,
            name: name.to_string(),
            agent,
            released: false,
        }))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MlService::Remote(_) => "remote",
            MlService::Pipeline(_) => "pipeline",
            MlService::Model(_) => "model",
        }
    }

    pub fn is_released(&self) -> bool {
        match self {
            MlService::Remote(r) => r.is_released(),
            MlService::Pipeline(p) => p.is_released(),
            MlService::Model(m) => m.is_released(),
        }
    }

    fn wrong(&self, operation: &'static str) -> Error {
        Error::WrongHandle {
            operation,
            kind: self.kind_name(),
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteService> {
        match self {
            MlService::Remote(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineServer> {
        match self {
            MlService::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    pub async fn register(&self, service_type: ServiceType, service_key: &str, payload: &[u8]) -> Result<()> {
        match self {
            MlService::Remote(r) => r.register(service_type, service_key, payload).await,
            MlService::Pipeline(_) | MlService::Model(_) => Err(self.wrong("register")),
        }
    }

    pub async fn register_with_options(&self, options: &OptionStore, payload: &[u8]) -> Result<()> {
        match self {
            MlService::Remote(r) => r.register_with_options(options, payload).await,
            MlService::Pipeline(_) | MlService::Model(_) => Err(self.wrong("register")),
        }
    }

    pub async fn send(&self, payload: &[u8], info: &OptionStore) -> Result<()> {
        match self {
            MlService::Remote(r) => r.send(payload, info).await,
            MlService::Pipeline(_) | MlService::Model(_) => Err(self.wrong("send")),
        }
    }

    pub async fn start(&self) -> Result<()> {
        match self {
            MlService::Pipeline(p) => p.start().await,
            MlService::Remote(_) | MlService::Model(_) => Err(self.wrong("start")),
        }
    }

    pub async fn stop(&self) -> Result<()> {
        match self {
            MlService::Pipeline(p) => p.stop().await,
            MlService::Remote(_) | MlService::Model(_) => Err(self.wrong("stop")),
        }
    }

    pub async fn state(&self) -> Result<PipelineState> {
        match self {
            MlService::Pipeline(p) => p.state().await,
            MlService::Remote(_) | MlService::Model(_) => Err(self.wrong("state")),
        }
    }

    pub async fn destroy(&mut self) -> Result<()> {
        match self {
            MlService::Pipeline(p) => p.destroy().await,
            MlService::Remote(_) | MlService::Model(_) => Err(self.wrong("destroy")),
        }
    }

    /// Release whatever the handle holds. Later operations fail.
    pub async fn release(&mut self) -> Result<()> {
        match self {
            MlService::Remote(r) => r.release().await,
            MlService::Pipeline(p) => {
                p.release();
                Ok(())
            }
            MlService::Model(m) => {
                m.released = true;
                Ok(())
            }
        }
    }
}
