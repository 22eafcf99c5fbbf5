//! Unix socket endpoint
//!
//! Each connection carries framed JSON: one [`AgentCall`] out, one
//! [`AgentReply`] back, per request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame, MAX_FRAME_SIZE};

use super::endpoint::{AgentConnection, AgentEndpoint, BusScope};
use super::messages::{AgentCall, AgentInterface, AgentReply, AgentRequest};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SocketEndpoint {
    scope: BusScope,
    path: PathBuf,
    connect_timeout: Duration,
}

impl SocketEndpoint {
    pub fn new(scope: BusScope, path: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            path: path.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn scope(&self) -> BusScope {
        self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AgentEndpoint for SocketEndpoint {
    fn name(&self) -> String {
        format!("{} bus at {}", self.scope, self.path.display())
    }

    async fn connect(&self, interface: AgentInterface) -> Result<Box<dyn AgentConnection>> {
        debug!(scope = %self.scope, path = %self.path.display(), "Connecting to ML agent socket");

        let stream = tokio::time::timeout(self.connect_timeout, UnixStream::connect(&self.path))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                target: self.name(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| Error::connection_failed(self.name(), e.to_string()))?;

        Ok(Box::new(SocketConnection { stream, interface }))
    }
}

struct SocketConnection {
    stream: UnixStream,
    interface: AgentInterface,
}

#[async_trait]
impl AgentConnection for SocketConnection {
    async fn call(&mut self, request: &AgentRequest) -> Result<AgentReply> {
        if request.interface() != self.interface {
            return Err(Error::Internal(format!(
                "'{}' sent over a {} connection",
                request.method_name(),
                self.interface.name()
            )));
        }

        let call = AgentCall::from(request.clone());
        write_frame(&mut self.stream, &call).await?;
        trace!(method = request.method_name(), "Sent agent request");

        let reply: AgentReply = read_frame(&mut self.stream, MAX_FRAME_SIZE).await?;
        trace!(method = request.method_name(), status = reply.status, "Received agent reply");
        Ok(reply)
    }
}
