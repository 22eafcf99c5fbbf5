//! ML agent endpoints
//!
//! The daemon may be reachable on the system bus, the session bus, or both.
//! [`EndpointProbe`] tries each configured endpoint in order and opens one
//! connection per call.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

use super::messages::{AgentInterface, AgentReply, AgentRequest};

/// Where an endpoint lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusScope {
    System,
    Session,
}

impl BusScope {
    pub fn name(&self) -> &'static str {
        match self {
            BusScope::System => "system",
            BusScope::Session => "session",
        }
    }

    /// Case-insensitive parse
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "system" => Some(BusScope::System),
            "session" => Some(BusScope::Session),
            _ => None,
        }
    }
}

impl fmt::Display for BusScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Something the client can open agent connections against
#[async_trait]
pub trait AgentEndpoint: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> String;

    /// Open a connection to one daemon interface
    async fn connect(&self, interface: AgentInterface) -> Result<Box<dyn AgentConnection>>;
}

/// An open connection. Dropping it closes it.
#[async_trait]
pub trait AgentConnection: Send {
    async fn call(&mut self, request: &AgentRequest) -> Result<AgentReply>;
}

pub type SharedEndpoint = Arc<dyn AgentEndpoint>;

/// Ordered endpoint list with fallback
pub struct EndpointProbe {
    endpoints: Vec<SharedEndpoint>,
}

impl EndpointProbe {
    pub fn new(endpoints: Vec<SharedEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[SharedEndpoint] {
        &self.endpoints
    }

    /// Connect to the first endpoint that answers.
    ///
    /// When every endpoint fails, the most recent failure is reported.
    pub async fn connect(&self, interface: AgentInterface) -> Result<Box<dyn AgentConnection>> {
        let mut last: Option<Error> = None;

        for endpoint in &self.endpoints {
            match endpoint.connect(interface).await {
                Ok(conn) => {
                    debug!(endpoint = %endpoint.name(), interface = interface.name(), "Connected to ML agent");
                    return Ok(conn);
                }
                Err(e) => {
                    debug!(endpoint = %endpoint.name(), error = %e, "ML agent endpoint unavailable");
                    last = Some(e);
                }
            }
        }

        Err(match last {
            Some(e) => Error::ServiceUnavailable {
                reason: e.to_string(),
                last: Some(Box::new(e)),
            },
            None => Error::ServiceUnavailable {
                reason: "no agent endpoints configured".to_string(),
                last: None,
            },
        })
    }
}
